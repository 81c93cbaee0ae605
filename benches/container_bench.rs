//! Benchmarks for module compilation and provider resolution

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use modular_di::{
    ApplicationContext, Args, BoxError, ContainerConfig, Dependency, DynamicModule, Lifetime, Module,
    ModuleMetadata, ModuleRef, OpaqueKeyStrategy, Provider, Service,
};
use std::hint::black_box;
use std::sync::Arc;

#[allow(dead_code)]
struct Config {
    url: String,
}

impl Service for Config {
    fn create(_: Args) -> Result<Self, BoxError> {
        Ok(Config {
            url: "postgres://localhost".into(),
        })
    }
}

#[allow(dead_code)]
struct Repository {
    config: Arc<Config>,
}

impl Service for Repository {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Config>()]
    }

    fn create(args: Args) -> Result<Self, BoxError> {
        Ok(Repository { config: args.get(0)? })
    }
}

#[allow(dead_code)]
struct RequestContext {
    repository: Arc<Repository>,
}

impl Service for RequestContext {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Repository>()]
    }

    fn scope() -> Lifetime {
        Lifetime::Request
    }

    fn create(args: Args) -> Result<Self, BoxError> {
        Ok(RequestContext {
            repository: args.get(0)?,
        })
    }
}

struct DataModule;

impl Module for DataModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::class::<Config>())
            .provider(Provider::class::<Repository>())
            .provider(Provider::class::<RequestContext>())
            .provider(
                Provider::factory_sync("COUNTER", Vec::<Dependency>::new(), |_| Ok(0_u64))
                    .with_scope(Lifetime::Transient),
            )
    }
}

struct PoolModule;

impl Module for PoolModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
    }
}

struct ManyPoolsModule;

impl Module for ManyPoolsModule {
    fn metadata() -> ModuleMetadata {
        (0..32_u32).fold(ModuleMetadata::new(), |metadata, size| {
            metadata.import(DynamicModule::new::<PoolModule>().provider(Provider::value("POOL_SIZE", size)))
        })
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

fn compile(rt: &tokio::runtime::Runtime, root: ModuleRef, config: ContainerConfig) -> ApplicationContext {
    rt.block_on(ApplicationContext::create(root, config))
        .expect("module graph compiles")
}

fn bench_compile(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("compile");

    group.bench_function("static_module", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                ApplicationContext::create(ModuleRef::of::<DataModule>(), ContainerConfig::default())
                    .await
                    .unwrap(),
            )
        })
    });

    let strategies = [
        ("deep_hash", OpaqueKeyStrategy::DeepHash),
        ("by_reference", OpaqueKeyStrategy::ByReference { shallow: false }),
    ];
    group.throughput(Throughput::Elements(32));
    for (name, strategy) in strategies {
        group.bench_with_input(BenchmarkId::new("dynamic_modules", name), &strategy, |b, strategy| {
            b.to_async(&rt).iter(|| async {
                let config = ContainerConfig::default().opaque_keys(*strategy);
                black_box(
                    ApplicationContext::create(ModuleRef::of::<ManyPoolsModule>(), config)
                        .await
                        .unwrap(),
                )
            })
        });
    }

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let rt = runtime();
    let app = compile(&rt, ModuleRef::of::<DataModule>(), ContainerConfig::default());
    let mut group = c.benchmark_group("resolution");

    group.bench_function("get_singleton", |b| {
        b.iter(|| black_box(app.get_as::<Repository>().unwrap()))
    });

    group.bench_function("resolve_singleton", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(app.resolve_as::<Repository>(None).await.unwrap()) })
    });

    group.bench_function("resolve_request_new_scope", |b| {
        b.to_async(&rt).iter(|| async {
            let scope = app.create_request_scope();
            black_box(app.resolve_as::<RequestContext>(Some(&scope)).await.unwrap())
        })
    });

    group.bench_function("resolve_request_cached", |b| {
        let scope = app.create_request_scope();
        b.to_async(&rt)
            .iter(|| async { black_box(app.resolve_as::<RequestContext>(Some(&scope)).await.unwrap()) })
    });

    group.bench_function("resolve_transient", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(app.resolve("COUNTER", None).await.unwrap()) })
    });

    group.finish();
}

criterion_group!(benches, bench_compile, bench_resolution);
criterion_main!(benches);
