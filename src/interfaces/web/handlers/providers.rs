use axum::Json;

use crate::core::llm::ProviderRegistry;

pub async fn get_providers_endpoint() -> Json<serde_json::Value> {
    let registry = match ProviderRegistry::load() {
        Ok(r) => r,
        Err(e) => {
            return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
        }
    };
    Json(serde_json::json!({
        "success": true,
        "providers": registry.providers.iter().map(|p| {
            serde_json::json!({
                "id": p.id,
                "name": p.name,
                "default_model": p.default_model,
                "env_key": p.auth.env_key,
                "models": p.models.iter().map(|m| {
                    serde_json::json!({ "id": m.id, "name": m.name })
                }).collect::<Vec<_>>()
            })
        }).collect::<Vec<_>>()
    }))
}
