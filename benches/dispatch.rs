use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dispatch_router::context::Context;
use dispatch_router::{Handler, Request, Router, RouterOptions};
use std::sync::Arc;

fn ok_handler() -> Arc<dyn Handler> {
    Arc::new(|ctx: &mut Context| {
        ctx.response_mut().status = 200;
        ctx.response_mut().mark_header_written();
    })
}

fn build_router() -> Router {
    let router = Router::new(RouterOptions::default());
    router.get("/health", vec![ok_handler()]).unwrap();
    router.get("/users/:id", vec![ok_handler()]).unwrap();
    router.get("/users/:id/posts/:post_id", vec![ok_handler()]).unwrap();
    router.get("/static/*", vec![ok_handler()]).unwrap();
    for i in 0..200 {
        router
            .get(&format!("/generated/route/{i}/:id"), vec![ok_handler()])
            .unwrap();
    }
    router
}

/// Honor `RUST_LOG` so a benchmark regression can be re-run with
/// dispatch-level tracing turned on.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn bench_dispatch(c: &mut Criterion) {
    init_tracing();
    let router = build_router();

    c.bench_function("static tier hit", |b| {
        b.iter(|| router.handle(Request::new("GET", black_box("/health")), None));
    });

    c.bench_function("dynamic tier hit", |b| {
        b.iter(|| router.handle(Request::new("GET", black_box("/users/42")), None));
    });

    c.bench_function("trie fallback (wildcard)", |b| {
        b.iter(|| router.handle(Request::new("GET", black_box("/static/css/app.css")), None));
    });

    c.bench_function("not found", |b| {
        b.iter(|| router.handle(Request::new("GET", black_box("/nope")), None));
    });
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
