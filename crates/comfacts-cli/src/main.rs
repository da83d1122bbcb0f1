use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfacts_core::{CompanyQuery, Resolution};
use comfacts_resolve::{is_web_url, CompanyResolver, ResolveConfig};
use comfacts_storage::{
    ArtifactStore, DocumentMetadata, HttpFetcher, HttpSignedUrlProvider, LogoResolver, SignedUrlProvider,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "comfacts")]
#[command(about = "Resolve public company facts from web sources")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve one company and print the fused record as JSON.
    Resolve {
        #[arg(long)]
        name: String,
        /// Source page to read directly; repeat for several. Skips search.
        #[arg(long = "url", value_parser = parse_web_url)]
        urls: Vec<String>,
        /// Reference logo: a local image path or a stored document id.
        #[arg(long)]
        logo: Option<String>,
        #[arg(long, env = "COMFACTS_USER_ID")]
        user_id: Option<String>,
        #[arg(long, env = "COMFACTS_USERNAME")]
        username: Option<String>,
    },
    /// Serve the HTTP API.
    Serve,
}

fn parse_web_url(raw: &str) -> Result<String, String> {
    if is_web_url(raw) {
        Ok(raw.trim().to_string())
    } else {
        Err(format!("not an http(s) URL: {raw}"))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "comfacts=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Resolve {
            name,
            urls,
            logo,
            user_id,
            username,
        } => {
            let metadata = (user_id.is_some() || username.is_some()).then(|| DocumentMetadata { user_id, username });
            resolve(name, urls, logo, metadata).await
        }
        Commands::Serve => {
            comfacts_web::serve_from_env().await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn resolve(
    name: String,
    urls: Vec<String>,
    logo: Option<String>,
    metadata: Option<DocumentMetadata>,
) -> Result<ExitCode> {
    let config = ResolveConfig::from_env();
    let fetcher = Arc::new(HttpFetcher::new(config.http_client_config())?);
    let resolver = CompanyResolver::from_config(&config, fetcher.clone())?;

    let mut query = CompanyQuery::by_name(name).with_urls(urls);
    if let Some(reference) = logo {
        let signed_urls = config
            .document_service_url
            .as_deref()
            .map(|url| Arc::new(HttpSignedUrlProvider::new(url)) as Arc<dyn SignedUrlProvider>);
        let logos = LogoResolver::new(ArtifactStore::new(config.artifacts_dir.clone()), fetcher, signed_urls);
        let path = logos.resolve(&reference, metadata.as_ref()).await?;
        query = query.with_reference_logo(path);
    }

    match resolver.resolve(&query).await {
        Resolution::Found { record, .. } => {
            let json = serde_json::to_string_pretty(&record).context("serializing company record")?;
            println!("{json}");
            Ok(ExitCode::SUCCESS)
        }
        Resolution::NotFound { .. } => {
            println!("No information found for the company.");
            Ok(ExitCode::FAILURE)
        }
    }
}
