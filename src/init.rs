//! Shared initialisation for the mos commands.
use anyhow::Context as AnyhowContext;
use anyhow::Result;
use slog::o;

use mos_client_ontap::Api;
use mos_client_ontap::HttpTransport;
use mos_cluster_dispatch::MonitorInvoker;
use mos_cluster_monitor::Monitor;
use mos_conf::payload_from_env;
use mos_conf::payload_from_event;
use mos_conf::MonitorOptions;
use mos_conf::Payload;
use mos_context::Context;
use mos_secrets::Secrets;
use mos_store::Blobs;
use mos_store::StateStore;
use mos_stream_alerts::AlertSinks;
use mos_stream_alerts::LogStream;
use mos_stream_alerts::PubSub;
use mos_stream_alerts::Syslog;
use mos_stream_alerts::Webhook;

use super::backends;
use super::cmd::Cli;
use super::logging;

/// Initialise the process root context and register metrics.
pub fn context() -> Context {
    let logger = logging::configure();
    let registry = prometheus::Registry::new();
    mos_client_ontap::register_metrics(&logger, &registry);
    mos_cluster_dispatch::register_metrics(&logger, &registry);
    mos_cluster_monitor::register_metrics(&logger, &registry);
    mos_ingest_audit::register_metrics(&logger, &registry);
    mos_stream_alerts::register_metrics(&logger, &registry);
    Context::root(logger).build()
}

/// Build the invocation payload from the event file or the environment.
pub fn payload(cli: &Cli) -> Result<Payload> {
    match &cli.payload {
        None => Ok(payload_from_env()),
        Some(path) => {
            let body = std::fs::read(path)
                .with_context(|| format!("unable to read payload file '{}'", path))?;
            let event = serde_json::from_slice(&body)
                .with_context(|| format!("unable to decode payload file '{}'", path))?;
            payload_from_event(&event)
        }
    }
}

/// Blob store over the configured local data directory.
pub fn blobs(cli: &Cli) -> Blobs {
    Blobs::from(backends::FsBlobStore::new(cli.data_dir.clone()))
}

/// Secret store over the configured secrets file.
pub fn secrets(cli: &Cli) -> Result<Secrets> {
    let store = match &cli.secrets {
        Some(path) => backends::FileSecretStore::load(path)?,
        None => backends::FileSecretStore::empty(),
    };
    Ok(Secrets::from(store))
}

/// Run one monitor pass for the cluster named by the payload.
pub async fn monitor_pass(
    context: &Context,
    blobs: &Blobs,
    secrets: &Secrets,
    payload: &Payload,
) -> Result<()> {
    let mut options = MonitorOptions::gather(payload)?;

    // Overlay the per-cluster config file, when one exists.
    let (config_key, explicit) = options.config_key();
    match blobs.get_text(context, &config_key).await? {
        Some(text) => options.apply_config_file(&text, &context.logger),
        None if explicit => slog::warn!(
            context.logger, "Per-cluster config file not found";
            "key" => config_key,
        ),
        None => (),
    }
    let conf = options.finish()?;

    let credentials = secrets
        .credentials(
            context,
            &conf.secret_ref,
            &conf.secret_username_key,
            &conf.secret_password_key,
        )
        .await?;
    let api = Api::from(HttpTransport::make(&conf.admin_server, credentials)?);
    let state = StateStore::new(blobs.clone(), conf.state_keys.clone());

    let mut sinks = AlertSinks::new(PubSub::from(backends::LoggerPubSub));
    if conf.log_group.is_some() {
        sinks = sinks.with_stream(LogStream::from(backends::LoggerLogStream));
    }
    if let Some(server) = &conf.syslog_ip {
        sinks = sinks.with_syslog(Syslog::new(server)?);
    }
    if let Some(endpoint) = &conf.webhook_endpoint {
        sinks = sinks.with_webhook(Webhook::new(endpoint, conf.webhook_severity)?);
    }
    sinks = sinks.lambda_runtime(std::env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok());

    let context = context
        .derive()
        .log_values(o!("cluster" => conf.admin_server.clone()))
        .build();
    Monitor::new(api, state, sinks, conf).run(&context).await
}

/// [`MonitorInvoker`] running monitors in-process.
pub struct LocalInvoker {
    blobs: Blobs,
    secrets: Secrets,
}

impl LocalInvoker {
    pub fn new(blobs: Blobs, secrets: Secrets) -> LocalInvoker {
        LocalInvoker { blobs, secrets }
    }
}

#[async_trait::async_trait]
impl MonitorInvoker for LocalInvoker {
    async fn invoke(&self, context: &Context, payload: Payload) -> Result<()> {
        monitor_pass(context, &self.blobs, &self.secrets, &payload).await
    }
}

/// [`ApiFactory`](mos_ingest_audit::ApiFactory) over the HTTPS transport.
pub struct HttpsClients;

#[async_trait::async_trait]
impl mos_ingest_audit::ApiFactory for HttpsClients {
    async fn connect(
        &self,
        _: &Context,
        host: &str,
        credentials: mos_secrets::Credentials,
    ) -> Result<Api> {
        Ok(Api::from(HttpTransport::make(host, credentials)?))
    }
}

