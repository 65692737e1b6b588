use tracing_subscriber::{
    filter::{Directive, LevelFilter},
    EnvFilter,
};

pub fn init_tracing() {
    let directive: Directive = match "energy_pipeline=info".parse() {
        Ok(d) => d,
        Err(_) => LevelFilter::INFO.into(),
    };
    let filter = EnvFilter::from_default_env().add_directive(directive);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
