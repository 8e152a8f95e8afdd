use tracing::{Instrument, trace_span};
use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use pgvalue::Result;

mod roundtrip;
mod recover;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::Registry::default()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    roundtrip::main().instrument(trace_span!("roundtrip")).await?;
    recover::main().instrument(trace_span!("recover")).await?;

    Ok(())
}
