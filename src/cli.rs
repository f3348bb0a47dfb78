use clap::Parser;

/// Calendar enrichment service that resolves classroom codes to addresses
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format(), env = "TRACING")]
    pub tracing: TracingFormat,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Compact human-readable output
    Pretty,
    /// One JSON object per line
    Json,
}

fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}

/// Long-running services the application is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceName {
    Web,
    Refresher,
    Workers,
}

impl ServiceName {
    pub fn all() -> Vec<ServiceName> {
        vec![
            ServiceName::Web,
            ServiceName::Refresher,
            ServiceName::Workers,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Web => "web",
            ServiceName::Refresher => "refresher",
            ServiceName::Workers => "workers",
        }
    }
}
