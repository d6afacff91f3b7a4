use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;

/// Вывести идентификаторы сессий, доступных в сконфигурированном source.
pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    let config = ServerConfig::load(&args.config)?;
    let source = config.build_source()?;

    let ids = source.sessions().await?;
    if ids.is_empty() {
        tracing::warn!(config = %args.config, "no sessions found");
    }
    for id in ids {
        println!("{id}");
    }
    Ok(())
}
