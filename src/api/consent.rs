use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::Engine,
    error::Result,
    model::{
        api::{ConsentRequest, ConsentResponse},
        session::Session,
    },
};

pub fn routes() -> Vec<Route> {
    routes![consent]
}

#[post("/consent", data = "<request>", format = "json")]
pub async fn consent(
    session: Session,
    request: Json<ConsentRequest>,
    engine: &State<Engine>,
) -> Result<Json<ConsentResponse>> {
    let record = engine
        .consent()
        .record_consent(&session, request.policy_version.as_deref())
        .await?;
    Ok(Json(record.into()))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{serde_json::json, Value},
    };

    use super::*;

    use crate::{config::Config, model::session::Step};

    #[backend_test(voter)]
    async fn consent_defaults_to_current_policy(client: Client, engine: Engine) {
        let response = client
            .post("/api/consent")
            .header(ContentType::JSON)
            .body("{}")
            .dispatch()
            .await;

        assert_eq!(Status::Ok, response.status());
        let body: ConsentResponse = response.into_json().await.unwrap();
        assert_eq!(body.policy_version, Config::example().policy_version());

        let email = "a@x.com".parse().unwrap();
        let voter = engine.identity().find_by_email(&email).await.unwrap().unwrap();
        assert!(engine.consent().has_current_consent(voter.id).await.unwrap());
    }

    #[backend_test(voter)]
    async fn repeated_consent_is_idempotent(client: Client) {
        let mut ids = Vec::new();
        for _ in 0..2 {
            let response = client
                .post("/api/consent")
                .header(ContentType::JSON)
                .body(json!(ConsentRequest::default()).to_string())
                .dispatch()
                .await;
            assert_eq!(Status::Ok, response.status());
            let body: Value = response.into_json().await.unwrap();
            ids.push(body["consentRecordId"].clone());
        }
        assert_eq!(ids[0], ids[1]);
    }

    #[backend_test(voter)]
    async fn stale_policy_does_not_complete_step(client: Client) {
        let response = client
            .post("/api/consent")
            .header(ContentType::JSON)
            .body(json!({ "policyVersion": "2019-01" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let response = client.get("/api/status").dispatch().await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["completedSteps"], json!([]));

        let response = client
            .post("/api/consent")
            .header(ContentType::JSON)
            .body("{}")
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let response = client.get("/api/status").dispatch().await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["completedSteps"], json!([Step::Consent]));
    }

    #[backend_test(voter)]
    async fn empty_policy_version_rejected(client: Client) {
        let response = client
            .post("/api/consent")
            .header(ContentType::JSON)
            .body(json!({ "policyVersion": "  " }).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::BadRequest, response.status());
    }
}
