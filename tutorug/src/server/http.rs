//! HTTP server implementation
//!
//! hyper http1 with TokioIo; one task per connection, routing by method and
//! path.

use bytes::Bytes;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use notify::NotificationSink;
use ::reputation::{PointsConfig, ReputationEngine};
use ::subscription::{
    BillingConfig, BillingService, LifecycleConfig, PaymentGateway, SubscriptionLifecycle,
    SubscriptionSweeper, SweepConfig,
};
use tutor_agent::{LlmBackend, TutorConfig, TutorService};
use tutorug_core::Clock;

use crate::auth::{AccessGate, JwtValidator, TOKEN_TTL_SECS};
use crate::config::Args;
use crate::jobs::{spawn_reminder_task, spawn_subscription_sweep_task};
use crate::routes::{self, chat, onboarding, payment, reputation, subscription};
use crate::stores::{Stores, UserProfiles};
use crate::types::{Result, TutorugError};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Where records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Mongo,
    /// Dev mode without a database; nothing survives a restart
    Memory,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mongo => "mongodb",
            Self::Memory => "memory",
        }
    }
}

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub storage: StorageMode,
    pub gate: AccessGate,
    pub billing: Arc<BillingService>,
    pub sweeper: Arc<SubscriptionSweeper>,
    pub reputation: Arc<ReputationEngine>,
    pub tutor: Arc<TutorService>,
    pub profiles: Arc<dyn UserProfiles>,
    pub notifier: Arc<dyn NotificationSink>,
    pub started_at: Instant,
}

/// Outside services the application talks to.
pub struct Providers {
    pub gateway: Arc<dyn PaymentGateway>,
    pub llm: Arc<dyn LlmBackend>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl AppState {
    /// Wire the domain services over `stores` and `providers`.
    pub fn assemble(
        args: Args,
        stores: Stores,
        providers: Providers,
        points: PointsConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let secret = args.jwt_secret().map_err(TutorugError::Config)?;
        let jwt = JwtValidator::new(&secret, TOKEN_TTL_SECS)?;

        let lifecycle = Arc::new(SubscriptionLifecycle::new(
            LifecycleConfig {
                trial_days: args.trial_days,
            },
            stores.subscriptions,
            Arc::clone(&clock),
        ));

        let billing = Arc::new(BillingService::new(
            Arc::clone(&lifecycle),
            providers.gateway,
            stores.contacts,
            Arc::clone(&providers.notifier),
            BillingConfig {
                webhook_secret: args.flutterwave_secret_hash.clone(),
                redirect_url: args.payment_redirect_url.clone(),
                ..BillingConfig::default()
            },
        ));

        let sweeper = Arc::new(SubscriptionSweeper::new(
            Arc::clone(&lifecycle),
            Arc::clone(&providers.notifier),
            SweepConfig::default(),
        ));

        let reputation = Arc::new(
            ReputationEngine::new(points, stores.reputation, Arc::clone(&clock))?
                .with_activity_log(stores.activity),
        );

        let tutor = Arc::new(
            TutorService::new(
                providers.llm,
                stores.sessions,
                clock,
                TutorConfig {
                    timeout: args.llm_timeout(),
                    ..TutorConfig::default()
                },
            )
            .with_reputation(Arc::clone(&reputation)),
        );

        Ok(Self {
            storage: stores.mode,
            gate: AccessGate::new(jwt, lifecycle),
            billing,
            sweeper,
            reputation,
            tutor,
            profiles: stores.profiles,
            notifier: providers.notifier,
            started_at: Instant::now(),
            args,
        })
    }
}

/// Bind, start the background jobs and serve until the process exits.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("TutorUG listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled - relaxed secrets and in-memory fallbacks");
    }

    spawn_subscription_sweep_task(
        Arc::clone(&state.sweeper),
        Arc::clone(&state.reputation),
        Duration::from_secs(state.args.subscription_sweep_secs),
    );
    spawn_reminder_task(
        Arc::clone(&state.sweeper),
        Duration::from_secs(state.args.reminder_sweep_secs),
    );

    serve(listener, state).await
}

/// Accept connections on `listener` forever.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = match route(state, req, &method, &path).await {
        Ok(response) => response,
        Err(e) => {
            if e.status_code().is_server_error() {
                error!(%method, %path, error = %e, "Request failed");
            } else {
                debug!(%method, %path, error = %e, "Request rejected");
            }
            routes::error_response(&e)
        }
    };

    info!(
        client = %addr,
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    Ok(response)
}

async fn route(
    state: Arc<AppState>,
    req: Request<Incoming>,
    method: &Method,
    path: &str,
) -> Result<Response<BoxBody>> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (method, segments.as_slice()) {
        (&Method::OPTIONS, _) => Ok(routes::cors_preflight()),

        (&Method::GET, ["health"]) | (&Method::GET, ["healthz"]) => {
            Ok(routes::health_check(state).await)
        }

        (&Method::POST, ["api", "onboarding"]) => onboarding::handle_onboarding(req, state).await,

        // Subscription
        (&Method::GET, ["api", "subscription"]) => subscription::handle_status(req, state).await,
        (&Method::POST, ["api", "subscription", "cancel"]) => {
            subscription::handle_cancel(req, state).await
        }

        // Payments
        (&Method::GET, ["api", "payments", "plans"]) => payment::handle_plans(state),
        (&Method::POST, ["api", "payments", "initiate"]) => {
            payment::handle_initiate(req, state).await
        }
        (&Method::GET, ["api", "payments", "verify", tx_ref]) => {
            payment::handle_verify(req, state, tx_ref).await
        }
        (&Method::GET, ["api", "payments", "history"]) => {
            payment::handle_history(req, state).await
        }
        (&Method::POST, ["api", "payments", "webhook"]) => {
            payment::handle_webhook(req, state).await
        }

        // Reputation
        (&Method::GET, ["api", "reputation"]) => reputation::handle_summary(req, state).await,
        (&Method::GET, ["api", "reputation", "weekly"]) => {
            reputation::handle_weekly(req, state).await
        }
        (&Method::GET, ["api", "reputation", "position"]) => {
            reputation::handle_position(req, state).await
        }
        (&Method::GET, ["api", "reputation", "leaderboard"]) => {
            reputation::handle_leaderboard(req, state).await
        }
        (&Method::GET, ["api", "reputation", "ranks"]) => {
            reputation::handle_rank_distribution(req, state).await
        }
        (&Method::POST, ["api", "reputation", "quiz"]) => {
            reputation::handle_quiz_completion(req, state).await
        }

        // AI tutor chat
        (&Method::POST, ["api", "chat", "sessions"]) => chat::handle_start(req, state).await,
        (&Method::GET, ["api", "chat", "sessions"]) => chat::handle_list(req, state).await,
        (&Method::GET, ["api", "chat", "sessions", id]) => {
            chat::handle_history(req, state, id).await
        }
        (&Method::POST, ["api", "chat", "sessions", id, "messages"]) => {
            chat::handle_ask(req, state, id).await
        }
        (&Method::POST, ["api", "chat", "sessions", id, "end"]) => {
            chat::handle_end(req, state, id).await
        }

        _ => Ok(not_found_response(path)),
    }
}

fn not_found_response(path: &str) -> Response<BoxBody> {
    routes::json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "error": "NOT_FOUND",
            "message": format!("No route for {}", path),
            "retryable": false,
        }),
    )
}

