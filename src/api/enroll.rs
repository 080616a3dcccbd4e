use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::Engine,
    error::Result,
    model::{
        api::{EnrollRequest, EnrollResponse},
        session::Session,
    },
};

pub fn routes() -> Vec<Route> {
    routes![enroll]
}

/// Enroll a biometric method, replacing any earlier enrollment of it.
#[post("/enroll", data = "<request>", format = "json")]
pub async fn enroll(
    session: Session,
    request: Json<EnrollRequest>,
    engine: &State<Engine>,
) -> Result<Json<EnrollResponse>> {
    let EnrollRequest { method, descriptor } = request.into_inner();
    let record = engine
        .enrollment()
        .enroll(&session, method, descriptor)
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

    use crate::model::enrollment::BiometricMethod;

    #[backend_test(voter)]
    async fn enroll_requires_consent(client: Client) {
        let response = client
            .post("/api/enroll")
            .header(ContentType::JSON)
            .body(json!(EnrollRequest::example()).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::Forbidden, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "ConsentMissing");
    }

    #[backend_test(consented)]
    async fn enroll_after_consent(client: Client, engine: Engine) {
        let response = client
            .post("/api/enroll")
            .header(ContentType::JSON)
            .body(json!(EnrollRequest::example()).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::Ok, response.status());
        let body: EnrollResponse = response.into_json().await.unwrap();
        assert_eq!(body.method, BiometricMethod::Fingerprint);

        let email = "a@x.com".parse().unwrap();
        let voter = engine.identity().find_by_email(&email).await.unwrap().unwrap();
        assert_eq!(
            engine.enrollment().enrolled_methods(voter.id).await.unwrap(),
            vec![BiometricMethod::Fingerprint]
        );
    }

    #[backend_test(enrolled)]
    async fn reenrollment_replaces(client: Client) {
        let response = client
            .post("/api/enroll")
            .header(ContentType::JSON)
            .body(json!(EnrollRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let response = client.get("/api/status").dispatch().await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["enrolledMethods"], json!(["fingerprint"]));
    }

    #[backend_test(consented)]
    async fn bad_descriptors(client: Client) {
        let response = client
            .post("/api/enroll")
            .header(ContentType::JSON)
            .body(json!({ "method": "fingerprint", "descriptor": "" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let response = client
            .post("/api/enroll")
            .header(ContentType::JSON)
            .body(json!({ "method": "iris", "descriptor": "AQ==" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
    }
}
