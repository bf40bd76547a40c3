//! wallet-analysis - submit wallets to the analysis API and follow the job

use anyhow::Context;
use clap::Parser;
use std::ops::ControlFlow;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_analysis_client::{
    AnalysisSession, Args, JobId, PollEvent, PresentedReport, WalletEntry, WalletList,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "wallet_analysis={lvl},wallet_analysis_client={lvl},info",
                    lvl = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Analysis API: {}", args.client_config().api_root());

    let mut session = AnalysisSession::from_config(args.client_config())?;

    match &args.job_id {
        Some(id) => {
            session.attach(JobId::new(id.as_str())).await;
        }
        None => {
            let wallets = wallet_list(&args)?;
            info!("Submitting {} wallets", wallets.len());
            let job = session.submit(&wallets).await?;
            info!("Analysis started: {}", job.id);
        }
    }

    let presented = session
        .run_to_completion_with(|job_id: &JobId, event: &PollEvent| {
            match event {
                PollEvent::Snapshot(s) => info!(
                    "[{}] {:.0}% {}",
                    job_id,
                    s.progress,
                    s.message.as_deref().unwrap_or("")
                ),
                PollEvent::Failed { error, .. } => warn!("[{}] {}", job_id, error),
                PollEvent::Started | PollEvent::Completed(_) => {}
            }
            ControlFlow::Continue(())
        })
        .await?;

    if args.json {
        print_json(&presented)?;
    } else {
        print_summary(&presented);
    }

    for format in &args.downloads {
        let path = session.save_artifact(format, &args.output_dir).await?;
        println!("Saved {}", path.display());
    }

    Ok(())
}

/// Wallets from `--wallet` flags followed by the contents of `--wallets-file`
fn wallet_list(args: &Args) -> anyhow::Result<WalletList> {
    let mut entries = args
        .wallets
        .iter()
        .map(|w| w.parse::<WalletEntry>())
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(path) = &args.wallets_file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading wallets file {}", path.display()))?;
        entries.extend(WalletList::parse_lines(&contents)?.entries().iter().cloned());
    }

    Ok(WalletList::new(entries)?)
}

fn print_summary(presented: &PresentedReport) {
    let report = &presented.report;
    println!("Analysis {}", presented.job.id);
    println!("{}", report.summary);
    println!(
        "Graph: {} wallets, {} relationships",
        presented.graph.nodes.len(),
        presented.graph.edges.len()
    );

    for insight in &report.ai_insights {
        println!(
            "  {}  {} / {}  risk {:.2}",
            insight.wallet_address, insight.entity_type, insight.behavior_pattern, insight.risk_score
        );
        for observation in &insight.observations {
            println!("    - {}", observation);
        }
    }

    for flag in &presented.flags {
        println!("warning: {}", flag);
    }
}

fn print_json(presented: &PresentedReport) -> anyhow::Result<()> {
    let flags: Vec<String> = presented.flags.iter().map(ToString::to_string).collect();
    let output = serde_json::json!({
        "job": presented.job,
        "report": presented.report.as_ref(),
        "graph": presented.graph.to_elements(),
        "integrity_flags": flags,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
