//! Binary startup: logging, configuration, controller wiring and the scan run

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use tokio::sync::oneshot;

use crate::app::cli::{Args, Command, ScanArgs};
use crate::collector::api::{
    Collector, FilesystemCollector, PagedCollector, RestSourceClient, SourceKind,
};
use crate::core::config::PipelineConfig;
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::{init_logging, reconfigure_logging};
use crate::core::rate_limit::RateLimiter;
use crate::core::shutdown::ShutdownCoordinator;
use crate::notifications::api::{ProgressHub, WILDCARD_KEY};
use crate::scanner::api::{ScanController, ScanParams, ScanStatus};
use crate::store::api::{JsonLinesStore, MemoryStore, Store};
use crate::transport::sse::progress_events;

/// Run the binary; returns the process exit code
pub async fn startup() -> i32 {
    let args = Args::parse();

    let color = args.color && std::env::var_os("NO_COLOR").is_none();
    let log_file = args.log_file.as_ref().map(|p| p.to_string_lossy().into_owned());
    if let Err(e) = init_logging(
        args.log_level.as_deref(),
        args.log_format.as_deref(),
        log_file.as_deref(),
        color,
    ) {
        eprintln!("Cannot initialise logging: {}", e);
        return 2;
    }
    if args.verbose > 0 {
        if let Some(level) = args.effective_log_level() {
            if let Err(e) = reconfigure_logging(level) {
                log::warn!("Cannot raise log level to {}: {}", level, e);
            }
        }
    }
    log::info!("metaingest {} starting", crate::core::version::long_version());

    let config = match PipelineConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log_error_with_context(&e, "Failed to load configuration");
            return 2;
        }
    };

    match args.command {
        Command::Scan(scan) => run_scan(config, scan).await,
    }
}

/// Collectors for every source that can be served with this configuration
pub fn build_collectors(config: &PipelineConfig) -> Vec<Arc<dyn Collector>> {
    let mut collectors: Vec<Arc<dyn Collector>> = vec![Arc::new(FilesystemCollector::new())];

    for kind in [
        SourceKind::PagedDriveLike,
        SourceKind::PagedMessageLike,
        SourceKind::PagedMediaLike,
    ] {
        let (Some(source), Some(limit)) = (config.source_for(kind), config.limit_for(kind)) else {
            log::debug!("No endpoint configured for '{}'", kind);
            continue;
        };
        match RestSourceClient::from_config(kind, source) {
            Ok(client) => {
                let limiter = Arc::new(RateLimiter::new(limit.rate_per_sec, limit.burst));
                let mut collector = PagedCollector::new(Arc::new(client), limiter)
                    .with_policies(config.retry.page.clone(), config.retry.item.clone());
                if let Some(page_size) = source.page_size {
                    collector = collector.with_page_size(page_size);
                }
                collectors.push(Arc::new(collector));
            }
            Err(e) => log::warn!("Source '{}' unavailable: {}", kind, e),
        }
    }
    collectors
}

async fn run_scan(config: PipelineConfig, args: ScanArgs) -> i32 {
    let store: Arc<dyn Store> = match &args.out {
        Some(dir) => match JsonLinesStore::open(dir) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                log_error_with_context(&e, "Failed to open the output store");
                return 2;
            }
        },
        None => Arc::new(MemoryStore::new()),
    };

    let shutdown = ShutdownCoordinator::new();
    shutdown.listen_for_ctrl_c();

    let hub = ProgressHub::new(&config.hub);
    let mut builder = ScanController::builder(Arc::clone(&store), hub.clone())
        .config(config.clone())
        .shutdown(shutdown);
    for collector in build_collectors(&config) {
        builder = builder.collector(collector);
    }
    let controller = builder.build();

    let subscriber = match hub.get_subscriber(WILDCARD_KEY) {
        Ok(subscriber) => subscriber,
        Err(e) => {
            log_error_with_context(&e, "Failed to subscribe to progress");
            return 2;
        }
    };
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let printer = tokio::spawn(print_frames(subscriber, done_rx));

    let kind = SourceKind::from(args.source);
    let mut params = ScanParams::new(args.client_key.clone());
    if let Some(root) = args.root {
        params = params.with_root(root);
    }
    if let Some(query) = args.query {
        params = params.with_query(query);
    }

    let id = match controller.start_scan(kind, params).await {
        Ok(id) => id,
        Err(e) => {
            log_error_with_context(&e, "Failed to start scan");
            let _ = done_tx.send(());
            let _ = printer.await;
            return 1;
        }
    };

    let status = controller.await_scan(id).await;
    // Every snapshot, including each final one, is in the printer's buffer after this
    hub.publishers_closed().await;
    let _ = done_tx.send(());
    let _ = printer.await;

    match store.get_scan(id).await {
        Ok(scan) => match scan.status {
            ScanStatus::Completed => {
                log::info!("Scan {} completed", id);
                0
            }
            _ => {
                log::error!(
                    "Scan {} {}: {}",
                    id,
                    scan.status,
                    scan.error_message.as_deref().unwrap_or("no error recorded")
                );
                1
            }
        },
        Err(e) => {
            log::error!("Scan {} finished as {:?} but cannot be read back: {}", id, status, e);
            1
        }
    }
}

/// Print SSE frames until told to stop, then flush what is already buffered
async fn print_frames(
    subscriber: crate::notifications::api::ProgressSubscriber,
    mut done: oneshot::Receiver<()>,
) {
    let mut frames = Box::pin(progress_events(subscriber));
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(frame) => {
                    let _ = write!(stdout, "{}", frame);
                    let _ = stdout.flush();
                }
                None => return,
            },
            _ = &mut done => break,
        }
    }
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_millis(20), frames.next()).await {
        let _ = write!(stdout, "{}", frame);
    }
    let _ = stdout.flush();
}
