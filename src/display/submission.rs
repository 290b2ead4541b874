//! Signature submission HTTP client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Body of `POST /signature/submit`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureSubmission {
    pub customer_id: Option<String>,
    pub session_id: String,
    pub product_id: Option<String>,
    pub signature_data: String,
}

/// What the signature endpoint answered
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmissionReceipt {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl Default for SubmissionReceipt {
    fn default() -> Self {
        Self {
            success: true,
            message: None,
        }
    }
}

/// Consultation completion record, written once the customer has signed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub session_id: String,
    pub customer_id: Option<String>,
    pub product_id: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn for_submission(submission: &SignatureSubmission) -> Self {
        Self {
            session_id: submission.session_id.clone(),
            customer_id: submission.customer_id.clone(),
            product_id: submission.product_id.clone(),
            completed_at: Utc::now(),
        }
    }
}

/// Error types for the submission collaborator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmissionError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("HTTP error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Submission rejected: {0}")]
    Rejected(String),
}

/// HTTP client for the signature and completion endpoints
#[derive(Debug, Clone)]
pub struct SubmissionClient {
    base_url: String,
    signature_path: String,
    completion_path: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl SubmissionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signature_path: "/signature/submit".to_string(),
            completion_path: "/consultation/completion".to_string(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_paths(
        mut self,
        signature_path: impl Into<String>,
        completion_path: impl Into<String>,
    ) -> Self {
        self.signature_path = signature_path.into();
        self.completion_path = completion_path.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Submit a captured signature
    pub async fn submit_signature(
        &self,
        submission: &SignatureSubmission,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let url = self.url(&self.signature_path);
        debug!("Submitting signature for session {} to {}", submission.session_id, url);

        let body = self.post(&url, submission).await?;

        // An empty or non-JSON body from a 2xx response counts as accepted.
        let receipt: SubmissionReceipt = serde_json::from_str(&body).unwrap_or_default();
        if !receipt.success {
            return Err(SubmissionError::Rejected(
                receipt
                    .message
                    .unwrap_or_else(|| "signature was not accepted".to_string()),
            ));
        }

        info!(
            "Signature accepted for session {} (product {:?})",
            submission.session_id, submission.product_id
        );
        Ok(receipt)
    }

    /// Write the completion record; callers treat this as fire-and-forget
    pub async fn record_completion(&self, record: &CompletionRecord) -> Result<(), SubmissionError> {
        let url = self.url(&self.completion_path);
        self.post(&url, record).await?;
        debug!("Recorded completion for session {}", record.session_id);
        Ok(())
    }

    async fn post<T: Serialize>(&self, url: &str, body: &T) -> Result<String, SubmissionError> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| SubmissionError::Request(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(SubmissionError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }
}
