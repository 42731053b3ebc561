mod common;

use actix_web::{test, web, App};
use common::{TestEnv, PNG};
use docgen_server::auth::{LinkResponse, USER_ID_HEADER, USER_ROLE_HEADER};
use serde_json::{json, Value};

const BOUNDARY: &str = "----docgen-test-boundary";

fn multipart_body(payload: &Value, signature: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"payload\"\r\nContent-Type: application/json\r\n\r\n{}\r\n",
            payload
        )
        .as_bytes(),
    );
    if let Some(bytes) = signature {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"signature\"; filename=\"sig.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn contract_payload() -> Value {
    json!({
        "fields": {
            "project_name": "Harbor Bridge",
            "contract_type": "ABS",
            "contractor_name": "Acme Builders",
            "contract_value": 1250000
        }
    })
}

fn generation_request(path: &str, user: Option<&str>, body: Vec<u8>) -> test::TestRequest {
    let mut req = test::TestRequest::post().uri(path).insert_header((
        "content-type",
        format!("multipart/form-data; boundary={BOUNDARY}"),
    ));
    if let Some(user) = user {
        req = req.insert_header((USER_ID_HEADER, user));
    }
    req.set_payload(body)
}

#[actix_web::test]
async fn test_generate_contract_over_http() {
    let env = TestEnv::new();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(env.state.clone()))
            .configure(docgen_server::configure),
    )
    .await;

    let body = multipart_body(&contract_payload(), Some(PNG));
    let req = generation_request("/api/documents/contract", Some("1"), body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["contractNumber"], "ABS01");
    assert_eq!(json["project"]["name"], "Harbor Bridge");
    assert!(json["storagePath"].as_str().unwrap().starts_with("documents/"));
    assert!(json["fileId"].as_i64().is_some());
}

#[actix_web::test]
async fn test_generation_requires_identity() {
    let env = TestEnv::new();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(env.state.clone()))
            .configure(docgen_server::configure),
    )
    .await;

    let body = multipart_body(&contract_payload(), None);
    let req = generation_request("/api/documents/contract", None, body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(env.counters.current("ABS"), None);
}

#[actix_web::test]
async fn test_unknown_kind_and_bad_payload() {
    let env = TestEnv::new();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(env.state.clone()))
            .configure(docgen_server::configure),
    )
    .await;

    let body = multipart_body(&contract_payload(), None);
    let req = generation_request("/api/documents/invoice", Some("1"), body).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let body = multipart_body(&json!({ "fields": {} }), None);
    let req = generation_request("/api/documents/contract", Some("1"), body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "VALIDATION_ERROR");
    assert_eq!(json["retryable"], false);
}

#[actix_web::test]
async fn test_bad_signature_upload_is_rejected() {
    let env = TestEnv::new();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(env.state.clone()))
            .configure(docgen_server::configure),
    )
    .await;

    let body = multipart_body(&contract_payload(), Some(b"plain text, not an image"));
    let req = generation_request("/api/documents/contract", Some("1"), body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json["error"], "IMAGE_PAYLOAD_ERROR");
}

#[actix_web::test]
async fn test_download_link_flow() {
    let env = TestEnv::new();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(env.state.clone()))
            .configure(docgen_server::configure),
    )
    .await;

    let body = multipart_body(&contract_payload(), None);
    let req = generation_request("/api/documents/contract", Some("1"), body).to_request();
    let generated: Value = test::call_and_read_body_json(&app, req).await;
    let file_id = generated["fileId"].as_i64().unwrap();
    let storage_path = generated["storagePath"].as_str().unwrap().to_string();

    // another user cannot mint a link for the file
    let req = test::TestRequest::post()
        .uri(&format!("/api/files/{file_id}/link"))
        .insert_header((USER_ID_HEADER, "2"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::post()
        .uri(&format!("/api/files/{file_id}/link"))
        .insert_header((USER_ID_HEADER, "1"))
        .to_request();
    let link: LinkResponse = test::call_and_read_body_json(&app, req).await;
    assert!(link.url.starts_with("/download/"));
    assert_eq!(link.expires_in, 900);

    let req = test::TestRequest::get()
        .uri(&link.url)
        .insert_header((USER_ID_HEADER, "1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );
    let bytes = test::read_body(resp).await;
    assert_eq!(bytes.to_vec(), env.storage.get(&storage_path).await.unwrap());
    assert!(env.files.all()[0].last_downloaded_at.is_some());

    // the owner claim is checked against the caller
    let req = test::TestRequest::get()
        .uri(&link.url)
        .insert_header((USER_ID_HEADER, "2"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri(&link.url)
        .insert_header((USER_ID_HEADER, "99"))
        .insert_header((USER_ROLE_HEADER, "admin"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("{}x", link.url))
        .insert_header((USER_ID_HEADER, "1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json["message"], "This download link is invalid or has expired");
}

#[actix_web::test]
async fn test_admin_link_requires_admin() {
    let env = TestEnv::new();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(env.state.clone()))
            .configure(docgen_server::configure),
    )
    .await;

    let body = multipart_body(&contract_payload(), None);
    let req = generation_request("/api/documents/contract", Some("1"), body).to_request();
    let generated: Value = test::call_and_read_body_json(&app, req).await;
    let file_id = generated["fileId"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/files/{file_id}/link"))
        .insert_header((USER_ID_HEADER, "50"))
        .insert_header((USER_ROLE_HEADER, "admin"))
        .to_request();
    let link: LinkResponse = test::call_and_read_body_json(&app, req).await;

    // issued for the admin panel, so the owner alone cannot redeem it
    let req = test::TestRequest::get()
        .uri(&link.url)
        .insert_header((USER_ID_HEADER, "1"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}
