use std::sync::Arc;

use cardlens::{
    AppConfig, CardLookupOutcome, CardRecord, CatalogLookup, ConcurrentCardResolver, LookupClient,
    OcrsRecognizer, ScanPipeline,
};

/// Needs a real photograph of a "Sol Ring" card in `CARDLENS_SAMPLE_IMAGE`
/// and the ocrs models in their default location.
#[tokio::test(flavor = "multi_thread")]
#[ignore]
async fn sol_ring_photo_resolves() -> anyhow::Result<()> {
    let Ok(path) = std::env::var("CARDLENS_SAMPLE_IMAGE") else {
        eprintln!("CARDLENS_SAMPLE_IMAGE not set, skipping");
        return Ok(());
    };
    let config = AppConfig::default();
    let pipeline = ScanPipeline::new(&config.detection)?;
    let resolver = ConcurrentCardResolver::new(
        LookupClient::init(CatalogLookup::new(vec![
            CardRecord::named("Sol Ring"),
            CardRecord::named("Arcane Signet"),
            CardRecord::named("Command Tower"),
        ])),
        Arc::new(OcrsRecognizer::from_default_location(&config.resolver.allowed_chars)?),
        config.resolver,
    );

    let report = pipeline.scan(std::fs::read(path)?, &resolver).await?;

    assert!(report.cards_detected >= 1);
    assert!(report.outcomes.iter().any(|o| matches!(
        o,
        CardLookupOutcome::Success { data, .. } if data.name == "Sol Ring"
    )));
    Ok(())
}
