//! Biometric matching. The engine never compares templates itself; it asks a
//! [`Matcher`] for a similarity score and applies its own threshold.

use log::debug;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{error::Result, model::blob::Blob};

#[rocket::async_trait]
pub trait Matcher: Send + Sync {
    /// Similarity of a live assertion to an enrolled descriptor, in `[0, 1]`.
    async fn score(&self, descriptor: &Blob, assertion: &Blob) -> Result<f64>;
}

/// Scores 1.0 for byte-identical input and 0.0 otherwise.
/// Suitable for development and tests, where clients replay the enrolled
/// template as their assertion.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactMatcher;

#[rocket::async_trait]
impl Matcher for ExactMatcher {
    async fn score(&self, descriptor: &Blob, assertion: &Blob) -> Result<f64> {
        Ok(if descriptor.ct_eq(assertion) { 1.0 } else { 0.0 })
    }
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    descriptor: &'a Blob,
    assertion: &'a Blob,
}

#[derive(Deserialize)]
struct MatchResponse {
    score: f64,
}

/// Delegates to an external verification service over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteMatcher {
    client: HttpClient,
    url: String,
}

impl RemoteMatcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: HttpClient::new(),
            url: url.into(),
        }
    }
}

#[rocket::async_trait]
impl Matcher for RemoteMatcher {
    async fn score(&self, descriptor: &Blob, assertion: &Blob) -> Result<f64> {
        let response: MatchResponse = self
            .client
            .post(&self.url)
            .json(&MatchRequest {
                descriptor,
                assertion,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Remote matcher scored {:.3}", response.score);
        Ok(response.score)
    }
}

/// Matchers with scripted behaviour, for tests.
#[cfg(test)]
pub mod doubles {
    use std::time::Duration;

    use rocket::tokio::time::sleep;

    use super::*;
    use crate::error::Error;

    /// Always returns the same score.
    pub struct FixedMatcher(pub f64);

    #[rocket::async_trait]
    impl Matcher for FixedMatcher {
        async fn score(&self, _: &Blob, _: &Blob) -> Result<f64> {
            Ok(self.0)
        }
    }

    /// Takes far longer than any sensible timeout.
    pub struct StalledMatcher;

    #[rocket::async_trait]
    impl Matcher for StalledMatcher {
        async fn score(&self, _: &Blob, _: &Blob) -> Result<f64> {
            sleep(Duration::from_secs(30)).await;
            Ok(1.0)
        }
    }

    /// Fails as if the service were down.
    pub struct BrokenMatcher;

    #[rocket::async_trait]
    impl Matcher for BrokenMatcher {
        async fn score(&self, _: &Blob, _: &Blob) -> Result<f64> {
            Err(Error::Unavailable("matcher is down".to_string()))
        }
    }
}
