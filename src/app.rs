use crate::cli::ServiceName;
use crate::config::Config;
use crate::data::{self, classrooms};
use crate::reference::{HttpSource, ReferenceStore, Refresher};
use crate::services::manager::ServiceManager;
use crate::services::refresher::RefresherService;
use crate::services::web::WebService;
use crate::services::workers::WorkerPoolService;
use crate::state::AppState;
use crate::tasks::{TaskStore, WorkerSettings, sweep_work_dir};
use crate::utils::fmt_duration;
use anyhow::Context;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    db_pool: Option<SqlitePool>,
    work_dir: PathBuf,
    app_state: AppState,
    service_manager: ServiceManager,
}

impl App {
    /// Create a new App instance with all necessary components initialized
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let work_dir = config.work_dir();
        tokio::fs::create_dir_all(&work_dir)
            .await
            .with_context(|| format!("Failed to create work directory {}", work_dir.display()))?;
        let swept = sweep_work_dir(&work_dir)
            .await
            .with_context(|| format!("Failed to clean work directory {}", work_dir.display()))?;
        info!(work_dir = %work_dir.display(), swept, "work directory ready");

        let reference = ReferenceStore::new();

        let db_pool = match &config.database_url {
            Some(url) => {
                let pool = data::connect(url).await?;
                info!("database pool established");

                // Serve the last known table until the first refresh completes.
                match classrooms::get_all(&pool).await {
                    Ok(rows) if !rows.is_empty() => {
                        let count = reference.replace(rows);
                        info!(rows = count, "Loaded persisted classroom data");
                    }
                    Ok(_) => info!("No persisted classroom data yet"),
                    Err(e) => warn!(error = ?e, "Could not load persisted classroom data"),
                }
                Some(pool)
            }
            None => None,
        };

        let tasks = TaskStore::new(config.task_capacity, config.result_capacity);
        let app_state = AppState::new(
            tasks,
            reference,
            work_dir.clone(),
            config.max_upload_bytes,
        );
        let service_manager = ServiceManager::new(app_state.service_statuses.clone());

        Ok(App {
            config,
            db_pool,
            work_dir,
            app_state,
            service_manager,
        })
    }

    /// Setup and register services based on enabled service list
    pub fn setup_services(&mut self, services: &[ServiceName]) -> Result<(), anyhow::Error> {
        if services.contains(&ServiceName::Web) {
            let web_service = Box::new(WebService::new(self.config.port, self.app_state.clone()));
            self.service_manager
                .register_service(ServiceName::Web.as_str(), web_service);
        }

        if services.contains(&ServiceName::Refresher) {
            let source = HttpSource::new(self.config.source_url.clone(), self.config.fetch_timeout)?;
            let refresher = Refresher::new(
                Arc::new(source),
                self.app_state.reference.clone(),
                self.config.retry_policy(),
                self.config.refresh_interval,
            )
            .with_db_pool(self.db_pool.clone());
            info!(
                source = %self.config.source_url,
                interval = fmt_duration(self.config.refresh_interval),
                max_attempts = self.config.fetch_max_attempts,
                retry_delay = fmt_duration(self.config.fetch_retry_delay),
                "refresher configured"
            );
            self.service_manager.register_service(
                ServiceName::Refresher.as_str(),
                Box::new(RefresherService::new(refresher)),
            );
        }

        if services.contains(&ServiceName::Workers) {
            let pool = WorkerPoolService::new(
                self.config.workers,
                self.app_state.tasks.clone(),
                self.app_state.reference.clone(),
                WorkerSettings {
                    work_dir: self.work_dir.clone(),
                    pacing_delay: self.config.pacing_delay,
                },
                self.config.startup_wait,
            );
            self.service_manager
                .register_service(ServiceName::Workers.as_str(), Box::new(pool));
        }

        if !self.service_manager.has_services() {
            error!("No services enabled. Cannot start application.");
            return Err(anyhow::anyhow!("No services enabled"));
        }

        Ok(())
    }

    /// Start all registered services
    pub fn start_services(&mut self) {
        self.service_manager.spawn_all();
    }

    /// Run the application and handle shutdown signals
    pub async fn run(self) -> ExitCode {
        use crate::services::signals::handle_shutdown_signals;
        handle_shutdown_signals(self.service_manager, self.config.shutdown_timeout).await
    }
}
