//! fedsearch: interactive federated search demo
//!
//! Reads one query per line from stdin and fans it out to a handful of
//! sample providers. Results are printed as JSON lines as they arrive.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use fedsearch::providers::gallery::{
    GallerySearch, InMemoryGallery, Resource, ResourceState, ResourceType,
};
use fedsearch::providers::properties::{Field, MapGroup, MapItem, MapModel, PropertySearch};
use fedsearch::providers::timeout::Timeout;
use fedsearch::providers::{Callbacks, FnSource, ProviderError, SearchSource};
use fedsearch::{DispatchError, Dispatcher, Query, SearchProvider, Settings};
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Simulated latency of the sample geocoder
const GEOCODER_LATENCY: Duration = Duration::from_millis(300);

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting fedsearch v{}", fedsearch::VERSION);
    info!(
        primary = %settings.dispatcher.primary_provider,
        overrides = settings.providers.len(),
        "Loaded configuration"
    );

    let dispatcher = Dispatcher::spawn(settings);
    let settings = dispatcher.settings();

    let gallery = GallerySearch::new(sample_gallery())
        .with_name(settings.dispatcher.primary_provider.clone());
    register(&dispatcher, printing(gallery)).await?;

    let properties = PropertySearch::new(&sample_map());
    register(&dispatcher, printing(properties)).await?;

    let geocoder = FnSource::new("Geocoder", |query: Query| async move {
        tokio::time::sleep(GEOCODER_LATENCY).await;
        let places: Vec<String> = if query.is_empty() {
            Vec::new()
        } else {
            vec![format!("{} (approximate location)", query.text().trim())]
        };
        Ok::<_, ProviderError>(places)
    });
    register(&dispatcher, printing(Timeout::configured(geocoder, settings))).await?;

    let mut progress = dispatcher.aggregator();
    tokio::spawn(async move {
        let mut was_searching = false;
        while let Ok(snapshot) = progress.changed().await {
            let searching = snapshot.is_in_progress();
            if was_searching && !searching {
                info!(generation = ?snapshot.generation, "all providers settled");
            }
            was_searching = searching;
        }
    });

    info!("Type a query and press enter; end input to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let query = dispatcher.submit(line, None).await?;
        info!(
            generation = %query.generation(),
            in_progress = dispatcher.is_in_progress(),
            "submitted"
        );
    }

    dispatcher.aggregator().wait_until_idle().await?;
    for (provider, stats) in dispatcher.metrics().get_provider_stats() {
        info!(
            provider = %provider,
            dispatches = stats.dispatches,
            stale = stats.stale_drops,
            reliability = stats.reliability,
            avg_ms = ?stats.avg_response_time,
            "provider statistics"
        );
    }
    dispatcher.shutdown();

    Ok(())
}

/// Register a provider, skipping ones disabled in the configuration
async fn register<P: SearchProvider>(dispatcher: &Dispatcher, provider: P) -> Result<()> {
    match dispatcher.register(provider).await {
        Ok(_) => Ok(()),
        Err(DispatchError::Disabled(name)) => {
            warn!("Skipping disabled provider: {}", name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Pair a source with callbacks that print its answers
fn printing<S>(source: S) -> impl SearchProvider
where
    S: SearchSource,
    S::Output: Serialize,
{
    let name = source.name().to_string();
    let failing = name.clone();
    source.into_provider(Callbacks::new(
        move |output: S::Output| match serde_json::to_string(&output) {
            Ok(json) => println!("{name}: {json}"),
            Err(e) => warn!(provider = %name, "unprintable result: {}", e),
        },
        move |error: ProviderError| warn!(provider = %failing, %error, "search failed"),
    ))
}

fn sample_gallery() -> InMemoryGallery {
    let now = Utc::now();
    let resource = |id: &str, kind, name: &str, age_days: i64| Resource {
        id: id.to_string(),
        kind,
        name: name.to_string(),
        description: String::new(),
        state: ResourceState::Active,
        members: 0,
        updated: now - ChronoDuration::days(age_days),
    };

    InMemoryGallery::new()
        .with_resource(resource("gs-1", ResourceType::GeoSource, "World rivers", 3))
        .with_resource(resource("gs-2", ResourceType::GeoSource, "Paris districts", 10))
        .with_resource(resource("map-1", ResourceType::Map, "European capitals", 1))
        .with_resource(Resource {
            members: 12,
            ..resource("gal-1", ResourceType::Gallery, "Climate collection", 30)
        })
        .with_vocabulary(["population", "precipitation", "temperature", "elevation"])
}

fn sample_map() -> MapModel {
    let item = |id: &str, name: &str, fields: &[&str]| MapItem {
        id: id.to_string(),
        name: name.to_string(),
        fields: fields.iter().map(|f| Field::new(*f)).collect(),
    };

    MapModel {
        groups: vec![MapGroup {
            name: "Default".to_string(),
            items: vec![
                item("climate", "Climate 2050", &["2040 Temperature", "2050 Temperature"]),
                item("census", "Census", &["Population", "Area"]),
            ],
        }],
    }
}
