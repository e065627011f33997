//! MCP server core
//!
//! Routes JSON-RPC requests to the turnvault operation surface (§6.4):
//! `search_conversations`, `search_validated`, `search_failed`,
//! `most_recent`, `context_chain`, `force_sync`, `process_validation_feedback`,
//! `health_report`, `backfill_chains`. Each is exposed as an MCP tool.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use turnvault_core::enrichment::semantic_feedback::SemanticFeedbackAnalyzer;
use turnvault_core::{
    maintenance, EnrichedTurn, EnrichmentContext, EnrichmentProcessor, EnrichmentSource,
    PreferenceNudge, QueryFilter, QueryFlags, QueryRequest, Role, Store, ValidationLearner,
    ValidationPreference,
};

use crate::bulk;
use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListResourcesResult,
    ListToolsResult, ReadResourceRequest, ReadResourceResult, ResourceDescription,
    ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};

/// MCP server implementation wrapping the turnvault core.
pub struct McpServer {
    store: Store,
    processor: EnrichmentProcessor,
    semantic: SemanticFeedbackAnalyzer,
    learner: ValidationLearner,
    #[cfg(feature = "embeddings")]
    embedding_service: turnvault_core::EmbeddingService,
    initialized: bool,
    tool_call_count: AtomicU64,
}

impl McpServer {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            processor: EnrichmentProcessor::new(),
            semantic: SemanticFeedbackAnalyzer::new(),
            learner: ValidationLearner::new(),
            #[cfg(feature = "embeddings")]
            embedding_service: turnvault_core::EmbeddingService::new(),
            initialized: false,
            tool_call_count: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn processor(&self) -> &EnrichmentProcessor {
        &self.processor
    }

    /// Handle an incoming JSON-RPC request.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest { id, method, params, .. } = request;
        debug!("handling request: {}", method);

        if !self.initialized && method != "initialize" && method != "notifications/initialized" {
            warn!("rejecting '{}': server not initialized", method);
            return Some(JsonRpcResponse::error(id, JsonRpcError::server_not_initialized()));
        }

        let result = match method.as_str() {
            "initialize" => self.handle_initialize(params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(params),
            "resources/list" => self.handle_resources_list(),
            "resources/read" => self.handle_resources_read(params),
            "ping" => Ok(json!({})),
            other => {
                warn!("unknown method: {}", other);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        let negotiated_version = if request.protocol_version.as_str() < MCP_VERSION {
            request.protocol_version.clone()
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;
        info!("mcp session initialized with protocol version {}", negotiated_version);

        let result = InitializeResult {
            protocol_version: negotiated_version,
            server_info: ServerInfo { name: "turnvault".to_string(), version: env!("CARGO_PKG_VERSION").to_string() },
            capabilities: ServerCapabilities {
                tools: Some(Default::default()),
                resources: Some(Default::default()),
                prompts: None,
            },
            instructions: Some(
                "turnvault indexes AI-assistant conversation turns, enriches them with topic, \
                 quality and feedback-validation signals, and serves them back through a boosted \
                 similarity search. Use search_validated to recall solutions that were confirmed \
                 to work; use search_failed to recall approaches that were tried and didn't."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "search_conversations".to_string(),
                description: Some("Boosted similarity search over indexed conversation turns, with optional topic/validation/recency preferences.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "project": {"type": "string"},
                        "n": {"type": "integer", "default": 10},
                        "topic_focus": {"type": "string"},
                        "prefer_solutions": {"type": "boolean", "default": false},
                        "troubleshooting_mode": {"type": "boolean", "default": false},
                        "validation_preference": {"type": "string", "enum": ["validated_only", "include_failures", "neutral"], "default": "neutral"},
                        "prefer_recent": {"type": "boolean", "default": false},
                        "show_context_chain": {"type": "boolean", "default": false},
                        "chain_length": {"type": "integer", "default": 2}
                    },
                    "required": ["query"]
                }),
            },
            ToolDescription {
                name: "search_validated".to_string(),
                description: Some("Search for turns whose solutions were confirmed as validated.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "project": {"type": "string"},
                        "n": {"type": "integer", "default": 10},
                        "min_validation_strength": {"type": "number", "default": 0.0}
                    },
                    "required": ["query"]
                }),
            },
            ToolDescription {
                name: "search_failed".to_string(),
                description: Some("Search for turns whose solutions were refuted by later feedback.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "project": {"type": "string"},
                        "n": {"type": "integer", "default": 10}
                    },
                    "required": ["query"]
                }),
            },
            ToolDescription {
                name: "most_recent".to_string(),
                description: Some("Return the newest indexed turns by timestamp.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "role": {"type": "string", "enum": ["user", "assistant"]},
                        "project": {"type": "string"},
                        "n": {"type": "integer", "default": 10}
                    }
                }),
            },
            ToolDescription {
                name: "context_chain".to_string(),
                description: Some("Return the session window of turns around a given turn id.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "turn_id": {"type": "string"},
                        "radius": {"type": "integer", "default": 2}
                    },
                    "required": ["turn_id"]
                }),
            },
            ToolDescription {
                name: "force_sync".to_string(),
                description: Some("Run the incremental maintenance health scan and report counters.".to_string()),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            ToolDescription {
                name: "process_validation_feedback".to_string(),
                description: Some("Analyse feedback content against a prior solution turn and persist the validation outcome.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "solution_id": {"type": "string"},
                        "feedback_id": {"type": "string"},
                        "feedback_content": {"type": "string"}
                    },
                    "required": ["solution_id", "feedback_id", "feedback_content"]
                }),
            },
            ToolDescription {
                name: "health_report".to_string(),
                description: Some("Sample stored metadata and report per-field population and range-violation percentages plus a composite health score.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {"sample_limit": {"type": "integer", "default": 1000}}
                }),
            },
            ToolDescription {
                name: "backfill_chains".to_string(),
                description: Some("Re-link adjacency and propagate validation outcomes for one session.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {"session_key": {"type": "string"}},
                    "required": ["session_key"]
                }),
            },
        ];

        serde_json::to_value(ListToolsResult { tools }).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_call(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing tool call parameters")),
        };

        self.tool_call_count.fetch_add(1, Ordering::Relaxed);
        let args = request.arguments;

        let result = match request.name.as_str() {
            "search_conversations" => self.op_search_conversations(&args),
            "search_validated" => self.op_search_validated(&args),
            "search_failed" => self.op_search_failed(&args),
            "most_recent" => self.op_most_recent(&args),
            "context_chain" => self.op_context_chain(&args),
            "force_sync" => self.op_force_sync(),
            "process_validation_feedback" => self.op_process_validation_feedback(&args),
            "health_report" => self.op_health_report(&args),
            "backfill_chains" => self.op_backfill_chains(&args),
            other => return Err(JsonRpcError::method_not_found_with_message(&format!("unknown tool '{other}'"))),
        };

        let call_result = match result {
            Ok(value) => CallToolResult::ok(value),
            Err(message) => CallToolResult::error(message),
        };
        serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_resources_list(&self) -> Result<Value, JsonRpcError> {
        let resources = vec![ResourceDescription {
            uri: "turnvault://health".to_string(),
            name: "health".to_string(),
            description: Some("Composite health score and per-field range-violation report.".to_string()),
            mime_type: Some("application/json".to_string()),
        }];
        serde_json::to_value(ListResourcesResult { resources }).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_resources_read(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: ReadResourceRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing resource uri")),
        };

        if request.uri != "turnvault://health" {
            return Err(JsonRpcError::resource_not_found(&request.uri));
        }

        let report = maintenance::health_report(&self.store, 1000)
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))?;
        let text = serde_json::to_string_pretty(&health_report_json(&report))
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))?;

        serde_json::to_value(ReadResourceResult {
            contents: vec![crate::protocol::messages::ResourceContent {
                uri: request.uri,
                mime_type: Some("application/json".to_string()),
                text,
            }],
        })
        .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    // ---- operation implementations (§6.4) ----

    fn op_search_conversations(&self, args: &Value) -> Result<Value, String> {
        let request = build_query_request(args)?;
        self.run_query(&request)
    }

    fn op_search_validated(&self, args: &Value) -> Result<Value, String> {
        let mut request = build_query_request(args)?;
        request.flags.validation_preference = ValidationPreference::ValidatedOnly;
        let min_strength = args.get("min_validation_strength").and_then(Value::as_f64).unwrap_or(0.0) as f32;
        let results = self.run_query_rows(&request)?;
        let filtered: Vec<_> = results
            .into_iter()
            .filter(|scored| scored.turn.is_validated_solution && scored.turn.validation_strength >= min_strength)
            .collect();
        Ok(rows_to_json(&filtered))
    }

    fn op_search_failed(&self, args: &Value) -> Result<Value, String> {
        let mut request = build_query_request(args)?;
        request.flags.validation_preference = ValidationPreference::IncludeFailures;
        let results = self.run_query_rows(&request)?;
        let filtered: Vec<_> = results.into_iter().filter(|scored| scored.turn.is_refuted_attempt).collect();
        Ok(rows_to_json(&filtered))
    }

    fn op_most_recent(&self, args: &Value) -> Result<Value, String> {
        let n = args.get("n").and_then(Value::as_u64).unwrap_or(10) as usize;
        let role = args.get("role").and_then(Value::as_str).map(Role::from_raw);
        let project = args.get("project").and_then(Value::as_str).map(str::to_string);

        let mut turns = Vec::new();
        self.store
            .iterate(|turn| {
                if role.is_some_and(|r| r != turn.role) {
                    return Ok(());
                }
                if let Some(p) = &project {
                    if turn.project_key.as_deref() != Some(p.as_str()) {
                        return Ok(());
                    }
                }
                turns.push(turn.clone());
                Ok(())
            })
            .map_err(|e| e.to_string())?;

        turns.sort_by(|a, b| {
            b.timestamp_unix
                .unwrap_or(0.0)
                .partial_cmp(&a.timestamp_unix.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        turns.truncate(n);
        Ok(json!({ "turns": turns }))
    }

    fn op_context_chain(&self, args: &Value) -> Result<Value, String> {
        let turn_id = args.get("turn_id").and_then(Value::as_str).ok_or("turn_id is required")?;
        let radius = args.get("radius").and_then(Value::as_u64).unwrap_or(2) as usize;

        let anchor = self.store.get(turn_id).map_err(|e| e.to_string())?.ok_or("turn not found")?;
        let Some(session_key) = &anchor.session_key else {
            return Ok(json!({ "turns": [anchor] }));
        };
        let session_turns = self.store.turns_for_session(session_key).map_err(|e| e.to_string())?;
        let Some(idx) = session_turns.iter().position(|t| t.id == anchor.id) else {
            return Ok(json!({ "turns": [anchor] }));
        };
        let start = idx.saturating_sub(radius);
        let end = (idx + radius + 1).min(session_turns.len());
        Ok(json!({ "turns": session_turns[start..end] }))
    }

    fn op_force_sync(&self) -> Result<Value, String> {
        let report = maintenance::health_report(&self.store, 5000).map_err(|e| e.to_string())?;
        Ok(json!({
            "added": 0,
            "skipped": 0,
            "errors": 0,
            "sampled": report.sampled,
            "health_score": report.health_score
        }))
    }

    fn op_process_validation_feedback(&self, args: &Value) -> Result<Value, String> {
        let solution_id = args.get("solution_id").and_then(Value::as_str).ok_or("solution_id is required")?;
        let feedback_id = args.get("feedback_id").and_then(Value::as_str).ok_or("feedback_id is required")?;
        let feedback_content = args.get("feedback_content").and_then(Value::as_str).ok_or("feedback_content is required")?;

        let outcome = self
            .learner
            .process_feedback(&self.store, solution_id, feedback_id, feedback_content, &self.semantic)
            .map_err(|e| e.to_string())?
            .ok_or("solution turn not found")?;

        Ok(json!({
            "validation_strength": outcome.validation_strength,
            "is_validated_solution": outcome.is_validated_solution,
            "is_refuted_attempt": outcome.is_refuted_attempt,
        }))
    }

    fn op_health_report(&self, args: &Value) -> Result<Value, String> {
        let sample_limit = args.get("sample_limit").and_then(Value::as_u64).unwrap_or(1000);
        let report = maintenance::health_report(&self.store, sample_limit).map_err(|e| e.to_string())?;
        Ok(health_report_json(&report))
    }

    fn op_backfill_chains(&self, args: &Value) -> Result<Value, String> {
        let session_key = args.get("session_key").and_then(Value::as_str).ok_or("session_key is required")?;
        let changed = turnvault_core::backfill_session(&self.store, session_key, &self.semantic).map_err(|e| e.to_string())?;
        Ok(json!({ "session_key": session_key, "turns_updated": changed.len() }))
    }

    #[cfg(all(feature = "embeddings", feature = "vector-search"))]
    fn run_query_rows(&self, request: &QueryRequest) -> Result<Vec<turnvault_core::ScoredTurn>, String> {
        turnvault_core::query::query(&self.store, &self.embedding_service, request, now_unix())
            .map_err(|e| e.to_string())
    }

    #[cfg(not(all(feature = "embeddings", feature = "vector-search")))]
    fn run_query_rows(&self, _request: &QueryRequest) -> Result<Vec<turnvault_core::ScoredTurn>, String> {
        Err("vector search requires the embeddings and vector-search features".to_string())
    }

    fn run_query(&self, request: &QueryRequest) -> Result<Value, String> {
        let rows = self.run_query_rows(request)?;
        Ok(rows_to_json(&rows))
    }
}

fn now_unix() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn rows_to_json(rows: &[turnvault_core::ScoredTurn]) -> Value {
    let items: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "turn": row.turn,
                "base_similarity": row.base_similarity,
                "combined_score": row.combined,
                "context_chain": row.context_chain,
            })
        })
        .collect();
    json!({ "results": items })
}

fn health_report_json(report: &maintenance::HealthReport) -> Value {
    json!({
        "sampled": report.sampled,
        "population_pct": report.population_pct,
        "violation_pct": report.violation_pct,
        "health_score": report.health_score,
    })
}

fn parse_validation_preference(value: Option<&str>) -> ValidationPreference {
    match value {
        Some("validated_only") => ValidationPreference::ValidatedOnly,
        Some("include_failures") => ValidationPreference::IncludeFailures,
        _ => ValidationPreference::Neutral,
    }
}

fn build_query_request(args: &Value) -> Result<QueryRequest, String> {
    let text = args.get("query").and_then(Value::as_str).ok_or("query is required")?.to_string();
    let n = args.get("n").and_then(Value::as_u64).unwrap_or(10) as usize;
    let project_context = args.get("project").and_then(Value::as_str).map(str::to_string);

    let flags = QueryFlags {
        topic_focus: args.get("topic_focus").and_then(Value::as_str).map(str::to_string),
        prefer_solutions: args.get("prefer_solutions").and_then(Value::as_bool).unwrap_or(false),
        troubleshooting_mode: args.get("troubleshooting_mode").and_then(Value::as_bool).unwrap_or(false),
        validation_preference: parse_validation_preference(args.get("validation_preference").and_then(Value::as_str)),
        prefer_recent: args.get("prefer_recent").and_then(Value::as_bool).unwrap_or(false),
        show_context_chain: args.get("show_context_chain").and_then(Value::as_bool).unwrap_or(false),
        chain_length: args.get("chain_length").and_then(Value::as_u64).unwrap_or(2) as usize,
        preferences: Vec::<PreferenceNudge>::new(),
    };

    Ok(QueryRequest {
        text,
        project_context,
        n,
        flags,
        filter: QueryFilter { project_key: None, session_key: None, role: None },
    })
}

/// Feed a whole bulk transcript file through enrichment and persist it.
/// Used by the `ingest-bulk` CLI mode; kept here so it shares the server's
/// processor/store wiring.
pub fn ingest_bulk_file(server: &mut McpServer, contents: &str) -> Result<(u64, u64), String> {
    let (raw_turns, stats) = bulk::parse_file(contents);
    let mut added = 0u64;
    for raw in raw_turns {
        let ctx = EnrichmentContext { source: Some(EnrichmentSource::Bulk), ..Default::default() };
        let turn = server.processor.enrich(raw, &ctx);
        match server.store.add_one(&EnrichedTurn { turn, embedding: None }) {
            Ok(Some(_)) => added += 1,
            Ok(None) => {}
            Err(e) => warn!("failed to persist bulk turn: {e}"),
        }
    }
    Ok((added, stats.skipped))
}
