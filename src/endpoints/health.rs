use actix_web::{HttpResponse, Responder};
use chrono::Utc;
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    time: chrono::DateTime<Utc>,
}

pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthBody {
        status: "ok",
        time: Utc::now(),
    })
}
