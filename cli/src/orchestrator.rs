//! Migration orchestration
//!
//! Opens the client, drives the engine and always closes the connection once
//! it was opened. The connection lifecycle lives in [`migrate_with`] and
//! [`drop_schema_with`], generic over [`Client`]; the engine-facing sequence
//! lives in [`run_migration`] and [`drop_table`], which only need a
//! [`MigrationEngine`].

use std::sync::Arc;

use grator_migrations::{
    Direction, Event, Executor, MigrationEngine, MigrationError, MigrationFile, MigrationRecord,
    Migrator, MigratorOptions, Target,
};

use crate::Context;
use crate::config::EffectiveConfig;
use crate::credentials::resolve_password;
use crate::db::{Client, ClientHandle, ConnectionParams};
use crate::error::CliError;
use crate::output::LogSink;

/// Run the migrate command
pub async fn migrate(
    config: &EffectiveConfig,
    ctx: &Context,
) -> Result<Vec<MigrationRecord>, CliError> {
    let mut client = build_client(config, ctx).await?;
    migrate_with(&mut client, config, ctx.log.clone()).await
}

/// Run the drop-schema command
pub async fn drop_schema(config: &EffectiveConfig, ctx: &Context) -> Result<(), CliError> {
    let mut client = build_client(config, ctx).await?;
    drop_schema_with(&mut client, config, ctx.log.as_ref()).await
}

/// Connect `client`, migrate, then end the connection whatever the outcome
pub async fn migrate_with<C>(
    client: &mut C,
    config: &EffectiveConfig,
    log: Arc<dyn LogSink>,
) -> Result<Vec<MigrationRecord>, CliError>
where
    C: Client + Executor,
{
    client.connect().await?;
    tracing::debug!(driver = %config.driver, "connected");

    let result = {
        let mut engine = Migrator::new(&mut *client, engine_options(config));
        run_migration(
            &mut engine,
            config.target,
            &config.migration_pattern,
            log.clone(),
        )
        .await
    };

    close(client, log.as_ref()).await;
    result
}

/// Connect `client`, drop the schema table, then end the connection
pub async fn drop_schema_with<C>(
    client: &mut C,
    config: &EffectiveConfig,
    log: &dyn LogSink,
) -> Result<(), CliError>
where
    C: Client + Executor,
{
    client.connect().await?;
    tracing::debug!(driver = %config.driver, "connected");

    let result = {
        let mut engine = Migrator::new(&mut *client, engine_options(config));
        drop_table(&mut engine).await
    };

    close(client, log).await;
    result
}

/// Observe the engine, resolve versions and migrate to `target`
pub async fn run_migration<E>(
    engine: &mut E,
    target: Target,
    migration_pattern: &str,
    log: Arc<dyn LogSink>,
) -> Result<Vec<MigrationRecord>, CliError>
where
    E: MigrationEngine + ?Sized,
{
    let sink = log.clone();
    engine.on(
        Event::ValidationStarted,
        Box::new(move |file: &MigrationFile| {
            sink.log(&format!("verifying checksum of migration {}", file.filename));
        }),
    );
    let sink = log.clone();
    engine.on(
        Event::MigrationStarted,
        Box::new(move |file: &MigrationFile| sink.log(&format!("running {}", file.filename))),
    );

    if engine.migrations().await?.is_empty() {
        return Err(CliError::NoMigrationsFound(migration_pattern.to_string()));
    }

    let to = match target {
        Target::Max => engine.max_version().await?,
        Target::Version(version) => version,
    };

    let current = match engine.database_version().await {
        Ok(version) => version,
        Err(MigrationError::SchemaTableMissing(_)) => {
            log.log(&format!(
                "table {} does not exist - creating it.",
                engine.quoted_schema_table()
            ));
            0
        }
        Err(e) => return Err(e.into()),
    };

    log.log(&format!("version of database is: {current}"));
    log.log(&format!("migrating {} to {to}", Direction::between(current, to)));

    Ok(engine.migrate(Target::Version(to)).await?)
}

/// Drop the schema table, failing when it is not there
pub async fn drop_table<E>(engine: &mut E) -> Result<(), CliError>
where
    E: MigrationEngine + ?Sized,
{
    let table = engine.quoted_schema_table();
    if !engine.schema_table_exists().await? {
        return Err(CliError::SchemaTableMissing(table));
    }
    engine.run_query(&format!("DROP TABLE {table}")).await?;
    Ok(())
}

fn engine_options(config: &EffectiveConfig) -> MigratorOptions {
    MigratorOptions {
        dialect: config.driver.dialect(),
        schema_table: config.schema_table.clone(),
        migration_pattern: config.migration_pattern.clone(),
        validate_checksum: config.validate_checksum,
    }
}

/// Resolve the password and build a not yet connected client
async fn build_client(config: &EffectiveConfig, ctx: &Context) -> Result<ClientHandle, CliError> {
    let password = resolve_password(&config.password, config.driver, ctx.prompt.as_ref()).await?;
    ClientHandle::new(
        config.driver,
        ConnectionParams::from_config(config, password),
    )
}

async fn close<C: Client + ?Sized>(client: &mut C, log: &dyn LogSink) {
    if let Err(e) = client.end().await {
        tracing::warn!(error = %e, "failed to close connection");
        log.log(&format!("failed to close connection: {e}"));
    }
}
