use std::future::Future;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SuggestionError;
use crate::model::{Connection, ServiceNode, Topology};
use crate::{ElementStatus, NEW_CONNECTION_LOAD, Point, ServiceType};

/// Suggested coordinates live on a small grid; these map it onto the canvas.
const GRID_ORIGIN_SHIFT: f32 = 10.0;
const GRID_STEP_X: f32 = 40.0;
const GRID_STEP_Y: f32 = 30.0;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedNode {
    pub name: String,
    #[serde(rename = "type", default)]
    pub service_type: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedConnection {
    pub source_index: usize,
    pub target_index: usize,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSuggestion {
    pub nodes: Vec<SuggestedNode>,
    pub connections: Vec<SuggestedConnection>,
}

impl LayoutSuggestion {
    /// Parses a model reply, tolerating a surrounding markdown code fence.
    pub fn from_reply(text: &str) -> Result<Self, SuggestionError> {
        Ok(serde_json::from_str(strip_code_fence(text))?)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

impl Topology {
    /// Builds a fresh document from a suggestion. Groups are never suggested.
    pub fn from_suggestion(suggestion: &LayoutSuggestion) -> Result<Self, SuggestionError> {
        if suggestion.nodes.is_empty() {
            return Err(SuggestionError::Empty);
        }

        let batch = Uuid::new_v4().simple().to_string();
        let now = Utc::now();

        let nodes: Vec<ServiceNode> = suggestion
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                let service_type = ServiceType::parse_lenient(&node.service_type).unwrap_or_else(|| {
                    debug!(raw = %node.service_type, "unknown service type, using server");
                    ServiceType::Server
                });
                ServiceNode {
                    id: format!("ai-node-{index}-{batch}"),
                    name: node.name.clone(),
                    service_type,
                    position: Point::new(
                        (node.x + GRID_ORIGIN_SHIFT) * GRID_STEP_X,
                        (node.y + GRID_ORIGIN_SHIFT) * GRID_STEP_Y,
                    ),
                    status: ElementStatus::Online,
                    last_updated: now,
                }
            })
            .collect();

        let mut connections = Vec::with_capacity(suggestion.connections.len());
        for (index, link) in suggestion.connections.iter().enumerate() {
            let lookup = |node_index: usize| {
                nodes
                    .get(node_index)
                    .map(|node| node.id.clone())
                    .ok_or(SuggestionError::IndexOutOfRange {
                        connection: index,
                        index: node_index,
                        len: nodes.len(),
                    })
            };
            let source_id = lookup(link.source_index)?;
            let target_id = lookup(link.target_index)?;
            if source_id == target_id {
                warn!(connection = index, node = link.source_index, "skipping suggested self-loop");
                continue;
            }

            let mut connection = Connection::new(format!("ai-conn-{index}-{batch}"), source_id, target_id);
            connection.label = link.label.clone();
            connection.traffic_load = NEW_CONNECTION_LOAD;
            connections.push(connection);
        }

        Ok(Topology {
            nodes,
            groups: Vec::new(),
            connections,
        })
    }
}

/// Anything that can turn a free-text description into a layout.
pub trait LayoutSuggester {
    fn suggest(&self, description: &str) -> impl Future<Output = Result<LayoutSuggestion, SuggestionError>> + Send;
}

pub fn layout_prompt(description: &str) -> String {
    format!(
        "You are a senior cloud-native architect. Design a clean, well spaced 2D service topology \
         for the following description.\n\n\
         Description: {description}\n\n\
         Constraints:\n\
         1. X and Y coordinates range from 0 to 15. Keep nodes apart so they never overlap.\n\
         2. Each node type must be one of: database, server, gateway, cache, load_balancer, firewall, container.\n\
         3. connections[].sourceIndex and targetIndex are zero-based indices into nodes.\n\
         4. Reply with a single JSON object of the form \
         {{\"nodes\": [{{\"name\", \"type\", \"x\", \"y\"}}], \"connections\": [{{\"sourceIndex\", \"targetIndex\", \"label\"}}]}} and nothing else."
    )
}

#[derive(Debug, Clone)]
pub struct GeminiSuggester {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiSuggester {
    pub fn new(api_key: impl Into<String>, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String, SuggestionError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let request_body = serde_json::json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "responseMimeType": "application/json"
            }
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SuggestionError::Service { status, body });
        }

        let response_json: serde_json::Value = response.json().await?;
        response_json
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or(SuggestionError::MissingText)
    }
}

impl LayoutSuggester for GeminiSuggester {
    async fn suggest(&self, description: &str) -> Result<LayoutSuggestion, SuggestionError> {
        let reply = self.generate(&layout_prompt(description)).await?;
        LayoutSuggestion::from_reply(&reply)
    }
}

/// Health assessment of an existing topology. `score` is a percentage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyAnalysis {
    pub score: u8,
    pub summary: String,
    pub issues: Vec<String>,
}

#[derive(Deserialize)]
struct AnalysisReply {
    score: f32,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    issues: Vec<String>,
}

impl TopologyAnalysis {
    /// Parses a model reply; the score is rounded and clamped to 0..=100.
    pub fn from_reply(text: &str) -> Result<Self, SuggestionError> {
        let reply: AnalysisReply = serde_json::from_str(strip_code_fence(text))?;
        let score = if reply.score.is_finite() {
            reply.score.round().clamp(0.0, 100.0) as u8
        } else {
            0
        };
        Ok(Self {
            score,
            summary: reply.summary,
            issues: reply.issues,
        })
    }
}

pub trait TopologyAnalyzer {
    fn analyze(&self, topology: &Topology) -> impl Future<Output = Result<TopologyAnalysis, SuggestionError>> + Send;
}

/// Describes the document for the analysis model. Fails on a topology with no nodes.
pub fn analysis_prompt(topology: &Topology) -> Result<String, SuggestionError> {
    if topology.nodes.is_empty() {
        return Err(SuggestionError::NothingToAnalyze);
    }

    let mut prompt = String::from(
        "You are a senior site reliability engineer. Assess the health and resilience of the \
         following service topology.\n\nServices:\n",
    );
    for node in &topology.nodes {
        prompt.push_str(&format!(
            "- {} ({}, status {})\n",
            node.name,
            node.service_type.as_str(),
            node.status.as_str()
        ));
    }
    prompt.push_str("\nConnections:\n");
    for connection in &topology.connections {
        let source = topology.element_name(&connection.source_id).unwrap_or(connection.source_id.as_str());
        let target = topology.element_name(&connection.target_id).unwrap_or(connection.target_id.as_str());
        prompt.push_str(&format!(
            "- {source} -> {target}: {} (load {:.0}%)\n",
            connection.label,
            connection.traffic_load * 100.0
        ));
    }
    prompt.push_str(
        "\nReply with a single JSON object of the form \
         {\"score\": <0-100 health percentage>, \"summary\": <one sentence>, \"issues\": [<short findings>]} \
         and nothing else.",
    );
    Ok(prompt)
}

impl TopologyAnalyzer for GeminiSuggester {
    async fn analyze(&self, topology: &Topology) -> Result<TopologyAnalysis, SuggestionError> {
        let prompt = analysis_prompt(topology)?;
        debug!(nodes = topology.nodes.len(), "requesting topology analysis");
        let reply = self.generate(&prompt).await?;
        TopologyAnalysis::from_reply(&reply)
    }
}
