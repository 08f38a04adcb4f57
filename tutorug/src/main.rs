//! TutorUG - learning platform backend

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notify::{
    AfricasTalkingConfig, AfricasTalkingSms, Dispatcher, NotificationSink, SendGridConfig,
    SendGridEmail,
};
use reputation::PointsConfig;
use subscription::{FlutterwaveConfig, FlutterwaveGateway, MockGateway, PaymentGateway};
use tutor_agent::{LlmBackend, MockBackend, OpenAiBackend};
use tutorug::{
    config::{Args, LogFormat},
    db::MongoClient,
    server, AppState, Providers, Stores,
};
use tutorug_core::SystemClock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tutorug_subscriber_filter(&args.log_level);
    match args.log_format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  TutorUG - O-Level learning backend");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} (db '{}')", args.mongodb_uri, args.mongodb_db);
    info!("Trial: {} days", args.trial_days);
    info!("LLM model: {}", args.openai_model);
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let stores = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(mongo) => {
            info!("MongoDB connected successfully");
            Stores::mongo(&mongo).await?
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory stores): {}", e);
                Stores::in_memory()
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let points = match &args.points_config {
        Some(path) => {
            info!("Loading points configuration from {}", path.display());
            PointsConfig::from_yaml(&std::fs::read_to_string(path)?)?
        }
        None => PointsConfig::default(),
    };

    let providers = Providers {
        gateway: payment_gateway(&args)?,
        llm: llm_backend(&args)?,
        notifier: notifier(&args, &stores),
    };

    let state = AppState::assemble(args, stores, providers, points, Arc::new(SystemClock))?;
    server::run(Arc::new(state)).await?;
    Ok(())
}

fn tutorug_subscriber_filter(log_level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("tutorug={},info", log_level).into())
}

fn payment_gateway(args: &Args) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match &args.flutterwave_secret_key {
        Some(key) => {
            let mut config = FlutterwaveConfig::new(key.clone());
            if let Some(url) = &args.flutterwave_base_url {
                config = config.with_base_url(url.clone());
            }
            Ok(Arc::new(FlutterwaveGateway::new(config)?))
        }
        None => {
            warn!("FLUTTERWAVE_SECRET_KEY not set - using mock payment gateway");
            Ok(Arc::new(MockGateway::new()))
        }
    }
}

fn llm_backend(args: &Args) -> anyhow::Result<Arc<dyn LlmBackend>> {
    if args.openai_api_key.is_none() && args.dev_mode {
        warn!("OPENAI_API_KEY not set - AI tutor answers with a canned mock reply");
        return Ok(Arc::new(MockBackend::new("mock-tutor").with_response(
            "Let us work through this step by step. What have you tried so far?",
        )));
    }
    if args.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY not set - AI tutor requests will fail");
    }
    Ok(Arc::new(OpenAiBackend::new(
        args.openai_base_url.clone(),
        args.openai_model.clone(),
        args.openai_api_key.clone(),
        args.llm_timeout(),
    )?))
}

fn notifier(args: &Args, stores: &Stores) -> Arc<dyn NotificationSink> {
    let mut dispatcher = Dispatcher::new(Arc::clone(&stores.contacts));

    match &args.africastalking_api_key {
        Some(key) => {
            let mut config = AfricasTalkingConfig::new(args.africastalking_username.clone(), key.clone());
            if args.africastalking_username == "sandbox" {
                config = config.with_base_url(AfricasTalkingConfig::SANDBOX_URL);
            }
            if args.sms_sender_id.is_some() {
                config.sender_id = args.sms_sender_id.clone();
            }
            match AfricasTalkingSms::new(config) {
                Ok(sms) => dispatcher = dispatcher.with_sms(Arc::new(sms)),
                Err(e) => warn!("SMS disabled: {}", e),
            }
        }
        None => warn!("AFRICASTALKING_API_KEY not set - SMS notifications disabled"),
    }

    match &args.sendgrid_api_key {
        Some(key) => match SendGridEmail::new(SendGridConfig::new(key.clone(), args.from_email.clone())) {
            Ok(email) => dispatcher = dispatcher.with_email(Arc::new(email)),
            Err(e) => warn!("Email disabled: {}", e),
        },
        None => warn!("SENDGRID_API_KEY not set - email notifications disabled"),
    }

    Arc::new(dispatcher)
}
