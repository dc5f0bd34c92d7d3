mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{OPS_KEY, multipart_body, spawn_app, spawn_app_with};
use serde_json::json;

#[tokio::test]
async fn health_is_public_but_api_requires_key() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(Request::get("/health").body(Body::empty()).expect("request"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app
        .send(
            Request::get("/api/kitchens")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app
        .send(
            Request::get(format!("/api/kitchens?key={OPS_KEY}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn oversized_json_body_returns_413_envelope() {
    let app = spawn_app_with(|cfg| cfg.basic.body_limit_mb = 1).await;

    let oversized = "a".repeat(2 * 1024 * 1024);
    let payload = format!(r#"{{"code":"BIG","name":"{oversized}"}}"#);
    let (status, body) = app
        .send(
            Request::post("/api/kitchens")
                .header("content-type", "application/json")
                .header("x-ops-key", OPS_KEY)
                .body(Body::from(payload))
                .expect("request"),
        )
        .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    assert_eq!(body["error"]["message"], "request body too large");
}

#[tokio::test]
async fn kitchen_validation_and_unique_code() {
    let app = spawn_app().await;

    let (status, body) = app
        .call(
            "POST",
            "/api/kitchens",
            Some(json!({ "code": "x", "name": "Cozinha" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION");

    let (status, _) = app
        .call(
            "POST",
            "/api/kitchens",
            Some(json!({ "code": "cz-01", "name": "   " })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let id = app.kitchen("cz-01").await;
    let (_, body) = app
        .call("GET", &format!("/api/kitchens/{id}"), None, None)
        .await;
    assert_eq!(body["data"]["code"], "CZ-01");

    let (status, body) = app
        .call(
            "POST",
            "/api/kitchens",
            Some(json!({ "code": "CZ-01", "name": "Outra" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, body) = app
        .call("POST", "/api/kitchens", Some(json!({ "name": 3 })), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn profile_validation_normalizes_contact_fields() {
    let app = spawn_app().await;
    let kitchen = app.kitchen("CZ-02").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/profiles",
            Some(json!({
                "email": "  Bia@Cozinha.COM ",
                "full_name": "Bia",
                "phone": "(11) 98765-4321",
                "work_start": "07:00",
                "work_end": "15:30:00",
                "kitchen_id": kitchen,
                "role": "NUTRICIONISTA",
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["email"], "bia@cozinha.com");
    assert_eq!(body["data"]["phone"], "5511987654321");
    assert_eq!(body["data"]["work_end"], "15:30");

    let (status, _) = app
        .call(
            "POST",
            "/api/profiles",
            Some(json!({ "email": "nope", "full_name": "X" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            "POST",
            "/api/profiles",
            Some(json!({ "email": "Ana@Cozinha", "full_name": "Ana" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["email"], "ana@cozinha");

    let (status, _) = app
        .call(
            "POST",
            "/api/profiles",
            Some(json!({
                "email": "late@cozinha.com",
                "full_name": "Late",
                "work_start": "18:00",
                "work_end": "08:00",
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            "POST",
            "/api/profiles",
            Some(json!({ "email": "bia@cozinha.com", "full_name": "Bia 2" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_profile_header_is_unauthorized() {
    let app = spawn_app().await;
    let (status, body) = app.call("GET", "/api/kitchens", None, Some(999)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn roles_gate_projects_tasks_and_kitchen_settings() {
    let app = spawn_app().await;
    let kitchen = app.kitchen("CZ-03").await;
    let other_kitchen = app.kitchen("CZ-04").await;
    let admin = app.member(kitchen, "admin@cz.com", "ADMIN", None).await;
    let nutri = app.member(kitchen, "nutri@cz.com", "NUTRICIONISTA", None).await;
    let aux = app.member(kitchen, "aux@cz.com", "AUX_ADM", None).await;

    // Nutricionista cannot manage projects but can create tasks.
    let (status, body) = app
        .call(
            "POST",
            &format!("/api/kitchens/{kitchen}/projects"),
            Some(json!({ "name": "Inventário" })),
            Some(nutri),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let project = app.project(kitchen, "Inventário").await;
    let (status, body) = app
        .call(
            "POST",
            &format!("/api/projects/{project}/tasks"),
            Some(json!({ "title": "Contar arroz", "assignee_id": aux, "priority": "HIGH" })),
            Some(nutri),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let task = body["data"]["id"].as_i64().expect("task id");
    assert_eq!(body["data"]["status"], "PENDING");

    // AUX_ADM may only change the status of their own task.
    let (status, _) = app
        .call(
            "PATCH",
            &format!("/api/tasks/{task}"),
            Some(json!({ "title": "Outro título" })),
            Some(aux),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            "PATCH",
            &format!("/api/tasks/{task}"),
            Some(json!({ "status": "DONE" })),
            Some(aux),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "DONE");
    assert!(body["data"]["completed_at"].is_string());

    // Reopening clears completion.
    let (_, body) = app
        .call(
            "PATCH",
            &format!("/api/tasks/{task}"),
            Some(json!({ "status": "IN_PROGRESS" })),
            Some(nutri),
        )
        .await;
    assert!(body["data"]["completed_at"].is_null());

    // Members only see their kitchen.
    let (status, _) = app
        .call(
            "GET",
            &format!("/api/kitchens/{other_kitchen}"),
            None,
            Some(nutri),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, body) = app.call("GET", "/api/kitchens", None, Some(nutri)).await;
    let listed: Vec<i64> = body["data"]
        .as_array()
        .expect("kitchen list")
        .iter()
        .filter_map(|k| k["id"].as_i64())
        .collect();
    assert_eq!(listed, vec![kitchen]);

    // Audit log is admin-only and records the work above.
    let (status, _) = app
        .call(
            "GET",
            &format!("/api/kitchens/{kitchen}/audit-logs"),
            None,
            Some(nutri),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .call(
            "GET",
            &format!("/api/kitchens/{kitchen}/audit-logs?limit=5"),
            None,
            Some(admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = body["data"]
        .as_array()
        .expect("audit list")
        .iter()
        .filter_map(|a| a["action"].as_str())
        .collect();
    assert_eq!(actions.len(), 5);
    assert_eq!(actions[0], "task.status_changed");
    assert!(actions.contains(&"task.created"));
}

#[tokio::test]
async fn task_filters_and_assignee_membership() {
    let app = spawn_app().await;
    let kitchen = app.kitchen("CZ-05").await;
    let other = app.kitchen("CZ-06").await;
    let nutri = app.member(kitchen, "n@cz.com", "NUTRICIONISTA", None).await;
    let outsider = app.member(other, "o@cz.com", "NUTRICIONISTA", None).await;
    let project = app.project(kitchen, "Limpeza").await;

    let (status, _) = app
        .call(
            "POST",
            &format!("/api/projects/{project}/tasks"),
            Some(json!({ "title": "Fogão", "assignee_id": outsider })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.task(project, json!({ "title": "Fogão", "assignee_id": nutri, "priority": "LOW" }))
        .await;
    app.task(project, json!({ "title": "Geladeira", "priority": "HIGH" }))
        .await;

    let (_, body) = app
        .call("GET", &format!("/api/projects/{project}/tasks"), None, None)
        .await;
    let titles: Vec<&str> = body["data"]
        .as_array()
        .expect("tasks")
        .iter()
        .filter_map(|t| t["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Geladeira", "Fogão"]);

    let (_, body) = app
        .call(
            "GET",
            &format!("/api/projects/{project}/tasks?assignee_id={nutri}"),
            None,
            None,
        )
        .await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, _) = app
        .call(
            "GET",
            &format!("/api/projects/{project}/tasks?status=WHATEVER"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn comments_can_be_deleted_by_author_or_admin_only() {
    let app = spawn_app().await;
    let kitchen = app.kitchen("CZ-07").await;
    let admin = app.member(kitchen, "a@cz.com", "ADMIN", None).await;
    let sup = app.member(kitchen, "s@cz.com", "SUPERVISORA", None).await;
    let aux = app.member(kitchen, "x@cz.com", "AUX_ADM", None).await;
    let project = app.project(kitchen, "Compras").await;
    let task = app.task(project, json!({ "title": "Cotação" })).await;
    let task_id = task["id"].as_i64().expect("task id");

    let (status, _) = app
        .call(
            "POST",
            &format!("/api/tasks/{task_id}/comments"),
            Some(json!({ "body": "  " })),
            Some(aux),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/tasks/{task_id}/comments"),
            Some(json!({ "body": "Fornecedor respondeu" })),
            Some(aux),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let comment = body["data"]["id"].as_i64().expect("comment id");
    assert_eq!(body["data"]["author_id"], aux);

    let (status, _) = app
        .call("DELETE", &format!("/api/comments/{comment}"), None, Some(sup))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .call("DELETE", &format!("/api/comments/{comment}"), None, Some(admin))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .call("DELETE", &format!("/api/comments/{comment}"), None, Some(admin))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn task_files_upload_download_and_delete() {
    let app = spawn_app().await;
    let kitchen = app.kitchen("CZ-08").await;
    let project = app.project(kitchen, "Cardápio").await;
    let task = app.task(project, json!({ "title": "Revisar" })).await;
    let task_id = task["id"].as_i64().expect("task id");

    let boundary = "XBOUNDARY";
    let body = multipart_body(
        boundary,
        &[],
        ("../cardápio semana.txt", "text/plain", b"arroz e feijao"),
    );
    let (status, body) = app
        .send(
            Request::post(format!("/api/tasks/{task_id}/files"))
                .header("x-ops-key", OPS_KEY)
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let file_id = body["data"]["id"].as_i64().expect("file id");
    assert_eq!(body["data"]["file_name"], "card_pio_semana.txt");
    assert_eq!(body["data"]["size_bytes"], 14);

    let resp = tower::ServiceExt::oneshot(
        app.app.clone(),
        Request::get(format!("/api/files/{file_id}/download"))
            .header("x-ops-key", OPS_KEY)
            .body(Body::empty())
            .expect("request"),
    )
    .await
    .expect("download");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-type"].to_str().expect("header"),
        "text/plain"
    );
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(&bytes[..], b"arroz e feijao");

    let (_, body) = app
        .call("GET", &format!("/api/tasks/{task_id}"), None, None)
        .await;
    assert_eq!(body["data"]["files"].as_array().map(Vec::len), Some(1));

    // A blob that cannot be removed does not fail the delete.
    let object_key = body["data"]["files"][0]["object_key"]
        .as_str()
        .expect("object key")
        .to_string();
    let blob = app.objects_root.join(&object_key);
    std::fs::remove_file(&blob).expect("remove blob");
    std::fs::create_dir(&blob).expect("replace blob with a directory");

    let (status, _) = app
        .call("DELETE", &format!("/api/files/{file_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .call("GET", &format!("/api/files/{file_id}/download"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reminder_times_preview() {
    let app = spawn_app().await;
    let (status, body) = app
        .call(
            "GET",
            "/api/reminders/times?start=08:00&end=17:00&frequency=3",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["times"], json!(["08:00", "12:30", "17:00"]));

    let (_, body) = app
        .call(
            "GET",
            "/api/reminders/times?start=bad&end=17:00&frequency=2",
            None,
            None,
        )
        .await;
    assert_eq!(body["data"]["times"], json!(["08:00", "12:00"]));

    let (status, body) = app
        .call(
            "GET",
            "/api/reminders/times?start=08:00&end=17:00&frequency=300",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["frequency"], 3);
    assert_eq!(body["data"]["times"], json!(["08:00", "12:30", "17:00"]));

    let (status, body) = app
        .call(
            "GET",
            "/api/reminders/times?start=08:00&end=17:00&frequency=-1",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["frequency"], 1);
    assert_eq!(body["data"]["times"], json!(["08:00"]));

    let (status, _) = app
        .call("GET", "/api/reminders/times?start=08:00", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn kitchen_admins_only_manage_their_own_people() {
    let app = spawn_app().await;
    let kitchen_a = app.kitchen("PF-A").await;
    let kitchen_b = app.kitchen("PF-B").await;
    let admin_a = app.member(kitchen_a, "admin@a.com", "ADMIN", None).await;
    let admin_b = app.member(kitchen_b, "admin@b.com", "ADMIN", None).await;
    let cook_b = app.member(kitchen_b, "cook@b.com", "AUX_ADM", None).await;
    let cook_a = app.member(kitchen_a, "cook@a.com", "AUX_ADM", None).await;

    let (status, _) = app
        .call("DELETE", &format!("/api/profiles/{admin_b}"), None, Some(admin_a))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .call(
            "PATCH",
            &format!("/api/profiles/{cook_b}"),
            Some(json!({ "full_name": "Renamed" })),
            Some(admin_a),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .call("GET", &format!("/api/profiles/{cook_b}"), None, Some(admin_a))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Kitchen B is untouched and its admin still gets in.
    let (status, _) = app
        .call("GET", &format!("/api/kitchens/{kitchen_b}"), None, Some(admin_b))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.call("GET", "/api/profiles", None, Some(admin_a)).await;
    let mut listed: Vec<i64> = body["data"]
        .as_array()
        .expect("profiles")
        .iter()
        .filter_map(|p| p["id"].as_i64())
        .collect();
    listed.sort_unstable();
    assert_eq!(listed, vec![admin_a, cook_a]);

    // Their own member stays manageable.
    let (status, body) = app
        .call(
            "PATCH",
            &format!("/api/profiles/{cook_a}"),
            Some(json!({ "full_name": "Cozinheiro A" })),
            Some(admin_a),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, _) = app
        .call("DELETE", &format!("/api/profiles/{cook_a}"), None, Some(admin_a))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.call("GET", "/api/profiles", None, None).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(3));
}
