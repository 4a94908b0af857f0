use axum::http::StatusCode;

pub async fn root() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Clypr bridge running")
}

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
