//! Outbound integrations: chat and ticketing notifications.
//!
//! Each platform handler is config-gated: missing credentials mean the
//! dispatch is skipped, not an error. Handlers are timeout-bounded and
//! their failures never propagate into the workflow.

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Per-request timeout for integration calls.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Notification event classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationEvent {
    /// A mission finished.
    ScanComplete,
    /// A new finding was recorded.
    VulnerabilityFound,
    /// A mission failed.
    ScanFailed,
    /// A high or critical severity finding was recorded.
    HighSeverityFinding,
    /// A schedule fired.
    ScheduleTriggered,
}

impl IntegrationEvent {
    /// Stable wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScanComplete => "scan_complete",
            Self::VulnerabilityFound => "vulnerability_found",
            Self::ScanFailed => "scan_failed",
            Self::HighSeverityFinding => "high_severity_finding",
            Self::ScheduleTriggered => "schedule_triggered",
        }
    }

    /// Headline used in chat notifications.
    fn headline(self) -> &'static str {
        match self {
            Self::ScanComplete => "Mission complete",
            Self::VulnerabilityFound => "New finding",
            Self::ScanFailed => "Mission failed",
            Self::HighSeverityFinding => "High severity finding",
            Self::ScheduleTriggered => "Scheduled mission triggered",
        }
    }
}

/// Outcome of one platform dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DispatchStatus {
    /// The notification was delivered.
    Sent,
    /// The platform is not configured.
    Skipped,
    /// Delivery failed.
    Error {
        /// Failure description.
        message: String,
    },
}

/// Jira connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraConfig {
    /// Instance base URL.
    pub base_url: String,
    /// Account email for basic auth.
    pub email: String,
    /// API token for basic auth.
    pub api_token: String,
    /// Project key findings are filed under.
    #[serde(default = "default_project_key")]
    pub project_key: String,
}

fn default_project_key() -> String {
    "SEC".to_owned()
}

/// Integration configuration; every platform optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Slack incoming-webhook URL.
    pub slack_webhook_url: Option<String>,
    /// Discord webhook URL.
    pub discord_webhook_url: Option<String>,
    /// Jira settings.
    pub jira: Option<JiraConfig>,
    /// Linear API key.
    pub linear_api_key: Option<String>,
    /// Linear team to file issues under.
    pub linear_team_id: Option<String>,
    /// Generic webhook URL.
    pub webhook_url: Option<String>,
}

/// Dispatches notifications to all configured platforms.
#[derive(Debug, Clone)]
pub struct IntegrationHub {
    client: reqwest::Client,
    config: IntegrationConfig,
}

impl IntegrationHub {
    /// Create a hub from configuration.
    pub fn new(config: IntegrationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Dispatch to every configured platform, logging per-platform results.
    pub async fn dispatch_all(&self, event: IntegrationEvent, payload: serde_json::Value) {
        for platform in ["slack", "discord", "jira", "linear", "webhook"] {
            match self.dispatch(platform, event, &payload).await {
                DispatchStatus::Sent => {
                    debug!(platform, event = event.as_str(), "notification sent");
                }
                DispatchStatus::Skipped => {}
                DispatchStatus::Error { message } => {
                    warn!(platform, event = event.as_str(), error = %message, "notification failed");
                }
            }
        }
    }

    /// Dispatch to one platform by name.
    pub async fn dispatch(
        &self,
        platform: &str,
        event: IntegrationEvent,
        payload: &serde_json::Value,
    ) -> DispatchStatus {
        match platform {
            "slack" => self.send_slack(event, payload).await,
            "discord" => self.send_discord(event, payload).await,
            "jira" => self.create_jira_issue(event, payload).await,
            "linear" => self.create_linear_issue(event, payload).await,
            "webhook" => self.send_webhook(event, payload).await,
            other => DispatchStatus::Error {
                message: format!("unknown platform: {other}"),
            },
        }
    }

    async fn send_slack(
        &self,
        event: IntegrationEvent,
        payload: &serde_json::Value,
    ) -> DispatchStatus {
        let Some(url) = &self.config.slack_webhook_url else {
            return DispatchStatus::Skipped;
        };

        let body = serde_json::json!({
            "text": fallback_text(event, payload),
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": event.headline() }
                },
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("```{}```", pretty(payload))
                    }
                }
            ]
        });

        self.post_json(url, &body).await
    }

    async fn send_discord(
        &self,
        event: IntegrationEvent,
        payload: &serde_json::Value,
    ) -> DispatchStatus {
        let Some(url) = &self.config.discord_webhook_url else {
            return DispatchStatus::Skipped;
        };

        let color = match event {
            IntegrationEvent::HighSeverityFinding | IntegrationEvent::ScanFailed => 0x00E0_1E5A,
            IntegrationEvent::VulnerabilityFound => 0x00EC_B22E,
            _ => 0x0036_C5F0,
        };

        let body = serde_json::json!({
            "content": fallback_text(event, payload),
            "embeds": [{
                "title": event.headline(),
                "description": pretty(payload),
                "color": color,
            }]
        });

        self.post_json(url, &body).await
    }

    async fn create_jira_issue(
        &self,
        event: IntegrationEvent,
        payload: &serde_json::Value,
    ) -> DispatchStatus {
        let Some(jira) = &self.config.jira else {
            return DispatchStatus::Skipped;
        };

        let auth = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", jira.email, jira.api_token));

        let body = serde_json::json!({
            "fields": {
                "project": { "key": jira.project_key },
                "summary": fallback_text(event, payload),
                "issuetype": { "name": "Task" },
                "description": {
                    "type": "doc",
                    "version": 1,
                    "content": [{
                        "type": "paragraph",
                        "content": [{ "type": "text", "text": pretty(payload) }]
                    }]
                }
            }
        });

        let url = format!("{}/rest/api/3/issue", jira.base_url.trim_end_matches('/'));
        let result = self
            .client
            .post(&url)
            .header("Authorization", format!("Basic {auth}"))
            .json(&body)
            .send()
            .await;

        status_of(result).await
    }

    async fn create_linear_issue(
        &self,
        event: IntegrationEvent,
        payload: &serde_json::Value,
    ) -> DispatchStatus {
        let (Some(api_key), Some(team_id)) =
            (&self.config.linear_api_key, &self.config.linear_team_id)
        else {
            return DispatchStatus::Skipped;
        };

        let body = serde_json::json!({
            "query": "mutation IssueCreate($input: IssueCreateInput!) { \
                      issueCreate(input: $input) { success } }",
            "variables": {
                "input": {
                    "teamId": team_id,
                    "title": fallback_text(event, payload),
                    "description": pretty(payload),
                }
            }
        });

        let result = self
            .client
            .post("https://api.linear.app/graphql")
            .header("Authorization", api_key)
            .json(&body)
            .send()
            .await;

        status_of(result).await
    }

    async fn send_webhook(
        &self,
        event: IntegrationEvent,
        payload: &serde_json::Value,
    ) -> DispatchStatus {
        let Some(url) = &self.config.webhook_url else {
            return DispatchStatus::Skipped;
        };

        let body = serde_json::json!({
            "event_type": event.as_str(),
            "payload": payload,
        });

        self.post_json(url, &body).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> DispatchStatus {
        status_of(self.client.post(url).json(body).send().await).await
    }
}

/// Map an HTTP result to a dispatch status.
async fn status_of(result: Result<reqwest::Response, reqwest::Error>) -> DispatchStatus {
    match result {
        Ok(response) if response.status().is_success() => DispatchStatus::Sent,
        Ok(response) => DispatchStatus::Error {
            message: format!("status {}", response.status()),
        },
        Err(e) => DispatchStatus::Error {
            message: e.to_string(),
        },
    }
}

/// Plain-text one-liner for chat fallbacks and issue titles.
fn fallback_text(event: IntegrationEvent, payload: &serde_json::Value) -> String {
    let subject = payload
        .get("title")
        .or_else(|| payload.get("mission_id"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("mission");
    format!("{}: {subject}", event.headline())
}

/// Compact pretty rendering of the payload, truncated for chat limits.
fn pretty(payload: &serde_json::Value) -> String {
    let text = serde_json::to_string_pretty(payload).unwrap_or_default();
    if text.len() > 2_000 {
        let truncated: String = text.chars().take(2_000).collect();
        format!("{truncated}…")
    } else {
        text
    }
}
