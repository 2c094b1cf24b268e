use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use deck_api::{CompositeRecords, CompositeWorkloadRecord, CreateCompositeWorkload, DeckConfig, InProcApi, ResourceKind};
use deck_select::SelectionQuery;
use serde_json::Value;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "deckctl", version, about = "kubedeck CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace; list commands span all namespaces when unset
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(clap::Args, Debug)]
struct PageArgs {
    /// Keep only names containing this text (case-sensitive)
    #[arg(long = "filter", default_value = "")]
    filter: String,
    /// 1-based page number
    #[arg(long = "page", default_value_t = 1)]
    page: i64,
    /// Page size
    #[arg(long = "limit", default_value_t = 20)]
    limit: i64,
}

impl PageArgs {
    fn query(&self) -> Result<SelectionQuery> { Ok(SelectionQuery::new(self.filter.clone(), self.limit, self.page)?) }
}

fn parse_kind(s: &str) -> Result<ResourceKind, String> { ResourceKind::from_str(s).map_err(|e| e.to_string()) }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List objects of a kind, newest first
    Ls {
        /// Kind, plural or short name, e.g. "deploy", "pods", "Ingress"
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Print one object as JSON
    Get {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        name: String,
    },
    /// Delete one object
    Delete {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        name: String,
    },
    /// Create an object from a JSON document
    Create {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        /// Path to the JSON document
        #[arg(short = 'f', long = "file")]
        file: String,
    },
    /// Replace an object from a JSON document
    Update {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        /// Path to the JSON document
        #[arg(short = 'f', long = "file")]
        file: String,
    },
    /// Set replicas on a Deployment or StatefulSet
    Scale {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        name: String,
        #[arg(long = "replicas")]
        replicas: i32,
    },
    /// Roll the pods of a Deployment, StatefulSet or DaemonSet
    Restart {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        name: String,
    },
    /// Object count per namespace
    Count {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
    },
    /// Pod containers and logs
    Pods {
        #[command(subcommand)]
        command: PodCommands,
    },
    /// Composite workloads (deployment + service + optional ingress)
    Workload {
        #[command(subcommand)]
        command: WorkloadCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PodCommands {
    /// Container names of a pod
    Containers { pod: String },
    /// Log tail of a pod container (DECK_POD_LOG_TAIL_LINES lines)
    Logs {
        pod: String,
        /// Container name; the pod's only container when omitted
        #[arg(short = 'c', long = "container")]
        container: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum WorkloadCommands {
    /// Create from a JSON request document
    Create {
        #[arg(short = 'f', long = "file")]
        file: String,
    },
    /// List tracked composite workloads
    Ls {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Show one tracked composite workload
    Get { id: i64 },
    /// Tear down a composite workload and drop its record
    Delete { id: i64 },
}

fn init_tracing() {
    let env = std::env::var("DECK_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("DECK_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid DECK_METRICS_ADDR; expected host:port");
        }
    }
}

/// Record store opened up front; the cluster connection is made on first use.
struct Session {
    config: DeckConfig,
    records: CompositeRecords,
    api: Option<InProcApi>,
}

impl Session {
    fn open(config: DeckConfig) -> Result<Self> {
        let records = InProcApi::open_records(&config)?;
        Ok(Self { config, records, api: None })
    }

    async fn api(&mut self) -> Result<&InProcApi> {
        if self.api.is_none() {
            self.api = Some(InProcApi::connect_with(self.config.clone(), self.records.clone()).await?);
        }
        self.api.as_ref().context("cluster connection unavailable")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let mut session = Session::open(DeckConfig::from_env())?;
    let ns = cli.namespace.as_deref();

    match cli.command {
        Commands::Ls { kind, page } => {
            let query = page.query()?;
            info!(kind = %kind, ns = ?ns, filter = %query.name(), "ls invoked");
            let sel = session.api().await?.list(kind, ns, &query).await?;
            match cli.output {
                Output::Human => {
                    println!("NAMESPACE        NAME                                AGE");
                    for item in &sel.items {
                        let (ns_col, name) = meta_cols(item);
                        println!("{:<16} {:<35} {}", ns_col, name, render_age(created_at(item)));
                    }
                    println!("-- page {}, {} matching", query.page(), sel.total);
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&sel)?),
            }
        }
        Commands::Get { kind, name } => {
            let obj = session.api().await?.get(kind, ns, &name).await?;
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
        Commands::Delete { kind, name } => {
            session.api().await?.delete(kind, ns, &name).await?;
            println!("{} {} deleted", kind, name);
        }
        Commands::Create { kind, file } => {
            let content = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file))?;
            let obj = session.api().await?.create(kind, ns, &content).await?;
            match cli.output {
                Output::Human => {
                    let (ns_col, name) = meta_cols(&obj);
                    println!("{} {}/{} created", kind, ns_col, name);
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&obj)?),
            }
        }
        Commands::Update { kind, file } => {
            let content = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file))?;
            let obj = session.api().await?.update(kind, ns, &content).await?;
            match cli.output {
                Output::Human => {
                    let (ns_col, name) = meta_cols(&obj);
                    println!("{} {}/{} updated", kind, ns_col, name);
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&obj)?),
            }
        }
        Commands::Scale { kind, name, replicas } => {
            let accepted = session.api().await?.scale(kind, ns, &name, replicas).await?;
            println!("{} {} scaled to {}", kind, name, accepted);
        }
        Commands::Restart { kind, name } => {
            session.api().await?.restart(kind, ns, &name).await?;
            println!("{} {} restarted", kind, name);
        }
        Commands::Count { kind } => {
            let counts = session.api().await?.count_per_namespace(kind).await?;
            match cli.output {
                Output::Human => {
                    for c in &counts {
                        println!("{:<24} {}", c.namespace, c.count);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&counts)?),
            }
        }
        Commands::Pods { command } => match command {
            PodCommands::Containers { pod } => {
                let names = session.api().await?.pod_containers(ns, &pod).await?;
                match cli.output {
                    Output::Human => names.iter().for_each(|n| println!("{}", n)),
                    Output::Json => println!("{}", serde_json::to_string_pretty(&names)?),
                }
            }
            PodCommands::Logs { pod, container } => {
                let text = session.api().await?.pod_logs(ns, &pod, container.as_deref()).await?;
                print!("{}", text);
            }
        },
        Commands::Workload { command } => match command {
            WorkloadCommands::Create { file } => {
                let content = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file))?;
                let req: CreateCompositeWorkload = serde_json::from_str(&content).with_context(|| format!("decoding {}", file))?;
                let rec = session.api().await?.workloads().create(&req).await?;
                print_record(cli.output, &rec)?;
            }
            WorkloadCommands::Ls { page } => {
                let query = page.query()?;
                let sel = session.records.list(&query)?;
                match cli.output {
                    Output::Human => {
                        println!("ID     NAME                 NAMESPACE        EXPOSURE   STAGE            AGE");
                        for r in &sel.items {
                            println!(
                                "{:<6} {:<20} {:<16} {:<10} {:<16} {}",
                                r.id,
                                r.name,
                                r.namespace,
                                r.exposure_type.as_str(),
                                r.stage.as_str(),
                                render_age(Some(r.created_at))
                            );
                        }
                        println!("-- page {}, {} matching", query.page(), sel.total);
                    }
                    Output::Json => println!("{}", serde_json::to_string_pretty(&sel)?),
                }
            }
            WorkloadCommands::Get { id } => {
                let rec = session.records.get(id)?;
                print_record(cli.output, &rec)?;
            }
            WorkloadCommands::Delete { id } => {
                session.api().await?.workloads().delete(id).await?;
                println!("composite workload {} deleted", id);
            }
        },
    }
    Ok(())
}

fn print_record(output: Output, rec: &CompositeWorkloadRecord) -> Result<()> {
    match output {
        Output::Human => {
            println!("id:        {}", rec.id);
            println!("name:      {}/{}", rec.namespace, rec.name);
            println!("replicas:  {}", rec.replica_count);
            println!("exposure:  {}", rec.exposure_type);
            println!("stage:     {}", rec.stage);
            println!("workload:  {}", rec.workload_resource_name);
            println!("service:   {}", rec.service_resource_name);
            if rec.has_route() {
                println!("route:     {}", rec.route_resource_name);
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(rec)?),
    }
    Ok(())
}

fn meta_cols(v: &Value) -> (String, String) {
    let meta = v.get("metadata");
    let name = meta.and_then(|m| m.get("name")).and_then(|v| v.as_str()).unwrap_or("");
    let ns = meta.and_then(|m| m.get("namespace")).and_then(|v| v.as_str()).unwrap_or("-");
    (ns.to_string(), name.to_string())
}

fn created_at(v: &Value) -> Option<DateTime<Utc>> {
    v.pointer("/metadata/creationTimestamp")
        .and_then(|t| t.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn render_age(created: Option<DateTime<Utc>>) -> String {
    let Some(created) = created else { return "-".to_string() };
    let mut secs = (Utc::now() - created).num_seconds().max(0) as u64;
    let days = secs / 86_400; secs %= 86_400;
    let hours = secs / 3600; secs %= 3600;
    let mins = secs / 60; secs %= 60;
    if days > 0 { format!("{}d{}h", days, hours) }
    else if hours > 0 { format!("{}h{}m", hours, mins) }
    else if mins > 0 { format!("{}m", mins) }
    else { format!("{}s", secs) }
}
