use actix_web::{get, post, web, HttpResponse, Result as WebResult};
use tracing::debug;

use crate::api::error::{json_error_handler, ApiError};
use crate::api::models::{
    required_session_id, ChatRequest, ChatResponse, HistoryQuery, SetTopicRequest, TopicQuery, TopicResponse,
};
use crate::chat::TurnOrchestrator;

// --- Turns ---

#[post("/chat")]
pub async fn submit_turn(
    orchestrator: web::Data<TurnOrchestrator>,
    req: web::Json<ChatRequest>,
) -> WebResult<HttpResponse, ApiError> {
    let request = req.into_inner().into_turn_request()?;
    debug!(session_id = %request.session_id, history = request.prior_context.len(), "Turn submitted");

    let outcome = orchestrator.submit_turn(request).await;
    Ok(HttpResponse::Ok().json(ChatResponse::from(outcome)))
}

#[get("/logs")]
pub async fn turn_log(orchestrator: web::Data<TurnOrchestrator>) -> WebResult<HttpResponse, ApiError> {
    let turns = orchestrator.turn_log().await?;
    Ok(HttpResponse::Ok().json(turns))
}

#[get("/sessions/{session_id}/turns")]
pub async fn session_turns(
    orchestrator: web::Data<TurnOrchestrator>,
    session_id: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> WebResult<HttpResponse, ApiError> {
    let turns = orchestrator
        .session_history(&session_id.into_inner(), query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(turns))
}

// --- Topics ---

#[post("/topic")]
pub async fn set_topic(
    orchestrator: web::Data<TurnOrchestrator>,
    req: web::Json<SetTopicRequest>,
) -> WebResult<HttpResponse, ApiError> {
    let (session_id, topic) = req.into_inner().validate()?;
    orchestrator.set_topic(&session_id, &topic).await;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/topic")]
pub async fn get_topic(
    orchestrator: web::Data<TurnOrchestrator>,
    query: web::Query<TopicQuery>,
) -> WebResult<HttpResponse, ApiError> {
    let session_id = required_session_id(query.into_inner().session_id)?;
    let topic = orchestrator.resolve_topic(&session_id).await;
    Ok(HttpResponse::Ok().json(TopicResponse { topic }))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "healthy"}))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health)).service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .service(submit_turn)
            .service(turn_log)
            .service(session_turns)
            .service(set_topic)
            .service(get_topic),
    );
}
