//! Launch Demo
//!
//! Boots the Orchestra runtime from `orchestra.toml` and replays the callbacks
//! an application receives while launching, opening a deep link and moving
//! to the background.
//!
//! Services are discovered three ways:
//!
//! ```text
//! #[service]        ──▶ identifier section ──▶ SectionLoader
//! discovery.modules ──▶ LaunchModule         ──▶ ModuleLoader
//! [[services]]      ──▶ PushService          ──▶ ManifestLoader
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package launch-demo -- --config demos/launch/orchestra.toml
//! cargo run --package launch-demo -- --url myapp://settings/privacy
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context as _, Result};
use clap::Parser;
use orchestra::prelude::*;
use orchestra::runtime::ConfigLoader;
use orchestra::runtime::logging;
use serde::Deserialize;
use tracing::{info, warn};

// ============================================================================
// Services
// ============================================================================

/// First in line for every launch; kept for the whole process.
#[service]
#[derive(Default)]
struct CrashReporter {
    launches: AtomicUsize,
}

impl Service for CrashReporter {
    fn priority() -> Priority {
        Priority::BOOT
    }

    fn retention() -> RetentionPolicy {
        RetentionPolicy::Hold
    }

    fn is_lazy() -> bool {
        false
    }

    fn register(registry: &mut Registry<Self>) {
        registry.on(events::DID_FINISH_LAUNCHING, |svc: &Self, ctx: &Context| {
            let n = svc.launches.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.user_info().insert("crash_reporter.armed", true);
            info!(launch = n, "Crash reporter armed");
        });
    }

    fn did_resolve(&self) {
        info!("Crash reporter constructed");
    }
}

/// Records lifecycle transitions.  Registered through the C string section.
#[service(cstr)]
#[derive(Default)]
struct Analytics;

impl Service for Analytics {
    fn priority() -> Priority {
        Priority::LOW
    }

    fn retention() -> RetentionPolicy {
        RetentionPolicy::Hold
    }

    fn register(registry: &mut Registry<Self>) {
        registry
            .on(events::DID_FINISH_LAUNCHING, |_: &Self, ctx: &Context| {
                let armed = ctx
                    .user_info()
                    .get_bool(&"crash_reporter.armed".into())
                    .unwrap_or(false);
                info!(armed, "Launch recorded");
            })
            .on(events::DID_ENTER_BACKGROUND, |_: &Self, _: &Context| {
                info!("Session flushed");
            });
    }
}

/// Handles deep links for the configured scheme and swallows them.
#[derive(Default)]
struct DeepLinkRouter;

#[derive(Deserialize)]
struct RouterArgs {
    scheme: String,
}

impl Service for DeepLinkRouter {
    fn priority() -> Priority {
        Priority::HIGH
    }

    fn register(registry: &mut Registry<Self>) {
        registry.on(events::OPEN_URL, |_: &Self, ctx: &Context| -> Result<Outcome> {
            let args: RouterArgs = ctx.args().deserialize()?;
            let Some(url) = ctx.parameters().get::<String>(&events::URL) else {
                return Ok(Outcome::failed("no url parameter"));
            };
            let prefix = format!("{}://", args.scheme);
            match url.strip_prefix(&prefix) {
                Some(route) => {
                    info!(route, "Deep link routed");
                    Ok(Outcome::stop(true))
                }
                None => Ok(Outcome::next().with_message("scheme not handled")),
            }
        });
    }
}

/// Fallback for URLs nobody claimed.
#[derive(Default)]
struct BrowserFallback;

impl Service for BrowserFallback {
    fn priority() -> Priority {
        Priority::LOW
    }

    fn register(registry: &mut Registry<Self>) {
        registry.on(events::OPEN_URL, |_: &Self, ctx: &Context| {
            let url = ctx.parameters().get::<String>(&events::URL);
            info!(url = url.as_deref().unwrap_or(""), "Opening in browser");
            Outcome::stop(false)
        });
    }
}

/// Supplies the routing services; enabled from `discovery.modules`.
#[module(name = "launch.LaunchModule")]
#[derive(Default)]
struct LaunchModule;

impl ModuleProvider for LaunchModule {
    fn provide_services(&self) -> Vec<ServiceDefinition> {
        vec![
            ServiceDefinition::of::<DeepLinkRouter>().arg("scheme", "myapp"),
            ServiceDefinition::of::<BrowserFallback>(),
        ]
    }
}

// ============================================================================
// Factory-built service
// ============================================================================

/// Registered from the `[[services]]` manifest, built by [`PushFactory`].
#[service(name = "launch.PushService", manual)]
#[derive(Default)]
struct PushService {
    endpoint: String,
}

impl Service for PushService {
    fn register(registry: &mut Registry<Self>) {
        registry.on(events::DID_FINISH_LAUNCHING, |svc: &Self, _: &Context| {
            info!(endpoint = %svc.endpoint, "Push registration sent");
        });
    }
}

#[factory(name = "launch.PushFactory")]
#[derive(Default)]
struct PushFactory;

impl ServiceFactory for PushFactory {
    fn make(&self, _ctx: &Context, args: &Args) -> Result<SharedService, BoxError> {
        let endpoint = args
            .get_as::<String>("endpoint")
            .ok_or("`endpoint` is required")?;
        Ok(SharedService::new(PushService { endpoint }))
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[derive(Parser)]
#[command(about = "Replays an application launch through the Orchestra runtime")]
struct Cli {
    /// Configuration file, searched for in the working directory otherwise.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(short, long)]
    profile: Option<String>,

    /// URL to open after launch.
    #[arg(long, default_value = "myapp://settings/privacy")]
    url: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    if let Some(profile) = &cli.profile {
        loader = loader.profile(profile);
    }
    let config = loader.load().context("loading configuration")?;
    logging::init_from_config(&config.logging);

    let orchestrator = Orchestrator::set_global(Orchestrator::from_config(config)?)?;
    orchestrator.resolve();

    for event in [events::APP_START, events::DID_FINISH_LAUNCHING] {
        let entries = orchestrator.entries_for(event.clone());
        info!(event = %event, entries = entries.len(), "Firing");
        orchestrator.fire_event(event);
    }

    let parameters = Parameters::new().with(events::URL, cli.url.clone());
    let report = orchestrator.fire_with_report(events::OPEN_URL, None, parameters);
    match report.value.as_bool() {
        Some(true) => info!(url = %cli.url, by = report.stopped_by, "URL handled in app"),
        Some(false) => info!(url = %cli.url, "URL handed to the browser"),
        None => warn!(url = %cli.url, "Nobody handled the URL"),
    }
    for failure in report.failures() {
        warn!(service = failure.service, message = ?failure.message, "Entry failed");
    }

    orchestrator.fire_event(events::DID_ENTER_BACKGROUND);

    if let Some(reporter) = orchestrator.service_of::<CrashReporter>() {
        info!(
            launches = reporter.launches.load(Ordering::SeqCst),
            "Crash reporter still resident"
        );
    }
    Ok(())
}
