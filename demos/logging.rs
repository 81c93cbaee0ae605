//! Example demonstrating the events emitted while a module graph is built
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```

use modular_di::{
    ApplicationContext, Args, BoxError, ContainerConfig, Dependency, DynamicModule, Lifetime, Module,
    ModuleMetadata, ModuleRef, Provider, Service,
};
use std::sync::Arc;

#[allow(dead_code)]
struct Database {
    url: Arc<&'static str>,
}

impl Service for Database {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::token("DB_URL")]
    }

    fn create(args: Args) -> Result<Self, BoxError> {
        println!("  [App] Connecting to the database...");
        Ok(Database { url: args.get(0)? })
    }
}

#[allow(dead_code)]
struct RequestContext {
    db: Arc<Database>,
}

impl Service for RequestContext {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Database>()]
    }

    fn scope() -> Lifetime {
        Lifetime::Request
    }

    fn create(args: Args) -> Result<Self, BoxError> {
        Ok(RequestContext { db: args.get(0)? })
    }
}

struct DatabaseModule;

impl Module for DatabaseModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::class::<Database>())
            .export(modular_di::Export::of::<Database>())
    }
}

impl DatabaseModule {
    fn for_root(url: &'static str) -> ModuleRef {
        DynamicModule::new::<DatabaseModule>()
            .provider(Provider::value("DB_URL", url))
            .into()
    }
}

struct AppModule;

impl Module for AppModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .import(DatabaseModule::for_root("postgres://localhost/mydb"))
            .import(DatabaseModule::for_root("postgres://localhost/mydb"))
            .provider(Provider::class::<RequestContext>())
    }
}

#[tokio::main]
async fn main() -> modular_di::Result<()> {
    // JSON if logging-json is enabled, pretty if logging-pretty is
    modular_di::logging::init();

    println!("=== Modular DI Logging Demo ===\n");

    // Logs: "Registered module" (the second import collapses onto the first),
    // "Reflected module", "Scanned module graph", "Instantiated module"
    let app = ApplicationContext::create(ModuleRef::of::<AppModule>(), ContainerConfig::default()).await?;

    // Logs: "Opened request scope"
    let scope = app.create_request_scope();
    let _ctx = app.resolve_as::<RequestContext>(Some(&scope)).await?;

    // Logs: "Released request scope" with the number of evicted instances
    scope.release();

    // Unknown tokens are reported, not logged
    let missing = app.get("MISSING");
    println!("  [App] {}", missing.err().map(|err| err.to_string()).unwrap_or_default());

    // Logs: "Application context closed"
    app.close().await?;

    println!("\n=== Demo Complete ===");
    println!("Tip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
    Ok(())
}
