//! Service wiring: routes, the completion endpoint, and lifecycle.

use std::io;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use log::{debug, warn};

use crate::config::Config;
use crate::http::error::HttpError;
use crate::http::response::ResponseWriter;
use crate::http::{Method, Request, StatusCode, router};
use crate::inference::{self, Generator};
use crate::json::{self, Value};
use crate::net::server::{HttpServer, ShutdownTrigger};

pub struct InferenceService {
    server: HttpServer,
}

impl InferenceService {
    pub fn new(config: Config) -> io::Result<InferenceService> {
        let generator = match &config.model_dir {
            Some(dir) => inference::load_from_directory(dir),
            None => inference::find_default_model_dir()
                .and_then(|dir| inference::load_from_directory(&dir)),
        };
        let generator = generator.unwrap_or_else(|e| {
            warn!("no model loaded, using placeholder generator: {e}");
            Box::new(inference::StubGenerator::default())
        });
        Self::with_generator(config, Arc::from(generator))
    }

    /// Wires the routes around an explicit generator; the entry
    /// point for tests that fake generation.
    pub fn with_generator(
        config: Config,
        generator: Arc<dyn Generator>,
    ) -> io::Result<InferenceService> {
        let handler = router::builder()
            .route("/healthz", health_check)
            .route("/v1/chat/completions", chat_completions(generator))
            .build()
            .map_err(io::Error::other)?;
        let server = HttpServer::new(config.server, handler)?;
        Ok(InferenceService { server })
    }

    pub fn start(&mut self) -> io::Result<()> {
        self.server.start()
    }

    pub fn stop(&self) {
        self.server.stop();
    }

    pub fn wait(&mut self) {
        self.server.wait();
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.server.shutdown_trigger()
    }
}

fn health_check(_req: &mut Request, resp: &mut ResponseWriter<'_>) -> Result<(), HttpError> {
    resp.write_status(StatusCode::Ok)
}

fn chat_completions(
    generator: Arc<dyn Generator>,
) -> impl Fn(&mut Request, &mut ResponseWriter<'_>) -> Result<(), HttpError> + Send + Sync {
    move |req: &mut Request, resp: &mut ResponseWriter<'_>| {
        if req.method != Method::Post {
            return Err(HttpError::NotFound(format!(
                "no route for {} {}",
                req.method, req.path
            )));
        }

        let content_length = req
            .header("Content-Length")
            .ok_or_else(|| HttpError::BadRequest("missing Content-Length".into()))?;
        let content_length: usize = content_length
            .parse()
            .map_err(|_| HttpError::BadRequest("bad Content-Length".into()))?;

        debug!("reading {content_length} bytes as json...");
        let request = json::parse_stream(&mut req.body, content_length)
            .map_err(|e| HttpError::BadRequest(format!("bad json: {e}")))?;
        debug!("read json request: {request}");

        let (model, gen_request) = parse_completion_request(&request)?;
        let message = generator.generate(&gen_request);

        let body = completion_response(&model, &message).to_string();
        resp.write_status(StatusCode::Ok)?;
        resp.write_header("Date", &httpdate::fmt_http_date(SystemTime::now()))?;
        resp.write_data(body.as_bytes())
    }
}

/// Pulls the model name and the first system and user messages out
/// of a completion request document.
fn parse_completion_request(request: &Value) -> Result<(String, inference::Request), HttpError> {
    let bad = |e: json::Error| HttpError::BadRequest(e.to_string());

    let model = request.get("model").map_err(bad)?.as_string().map_err(bad)?;
    let messages = request.get("messages").map_err(bad)?.as_array().map_err(bad)?;

    let mut system_message = None;
    let mut user_message = None;
    for entry in messages {
        let role = entry.get("role").map_err(bad)?.as_string().map_err(bad)?;
        let content = entry.get("content").map_err(bad)?.as_string().map_err(bad)?;
        let message = || inference::Message {
            role: role.to_string(),
            content: content.to_string(),
        };
        match role {
            "system" if system_message.is_none() => system_message = Some(message()),
            "user" if user_message.is_none() => user_message = Some(message()),
            _ => {}
        }
    }

    let system_message =
        system_message.ok_or_else(|| HttpError::BadRequest("missing system message".into()))?;
    let user_message =
        user_message.ok_or_else(|| HttpError::BadRequest("missing user message".into()))?;
    Ok((
        model.to_string(),
        inference::Request {
            system_message,
            user_message,
        },
    ))
}

fn obj<const N: usize>(members: [(&str, Value); N]) -> Value {
    Value::Object(
        members
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<IndexMap<String, Value>>(),
    )
}

fn completion_response(model: &str, message: &inference::Message) -> Value {
    let created = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    obj([
        ("id", Value::Str("parley-completion-123".into())),
        ("object", Value::Str("chat.completion".into())),
        ("created", Value::Num(created as f64)),
        ("model", Value::Str(model.into())),
        ("system_fingerprint", Value::Str("fp_1111111111".into())),
        (
            "choices",
            Value::Array(vec![obj([
                ("index", Value::Num(0.0)),
                (
                    "message",
                    obj([
                        ("role", Value::Str(message.role.clone())),
                        ("content", Value::Str(message.content.clone())),
                    ]),
                ),
                ("logprobs", Value::Null),
                ("finish_reason", Value::Str("stop".into())),
            ])]),
        ),
        (
            "usage",
            obj([
                ("prompt_tokens", Value::Num(1.0)),
                ("completion_tokens", Value::Num(1.0)),
                ("total_tokens", Value::Num(1.0)),
                (
                    "completion_tokens_details",
                    obj([
                        ("reasoning_tokens", Value::Num(1.0)),
                        ("accepted_prediction_tokens", Value::Num(0.0)),
                        ("rejected_prediction_tokens", Value::Num(0.0)),
                    ]),
                ),
            ]),
        ),
    ])
}
