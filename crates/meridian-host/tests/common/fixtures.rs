//! Service fixtures for host integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use meridian_core::{Args, Diagnosis, MethodTable, Service, ServiceError};

/// A service exposing `echo` and `greet` methods.
pub struct EchoService {
    name: String,
    methods: MethodTable,
}

impl EchoService {
    pub fn new(name: &str) -> Arc<dyn Service> {
        let methods = MethodTable::builder()
            .method("echo", |args: Args| async move { Ok(args.into_value()) })
            .method_expecting("greet", &["name"], |args: Args| async move {
                let name: String = args.get("name")?;
                Ok(json!({ "message": format!("Hello, {name}!") }))
            })
            .build();

        Arc::new(Self {
            name: name.to_owned(),
            methods,
        })
    }
}

#[async_trait]
impl Service for EchoService {
    fn name(&self) -> &str {
        &self.name
    }

    fn methods(&self) -> &MethodTable {
        &self.methods
    }
}

/// A service whose startup hook always fails.
pub struct BrokenStartup {
    methods: MethodTable,
}

impl BrokenStartup {
    pub fn new() -> Arc<dyn Service> {
        Arc::new(Self {
            methods: MethodTable::builder()
                .method("noop", |_args| async move { Ok(json!(null)) })
                .build(),
        })
    }
}

#[async_trait]
impl Service for BrokenStartup {
    fn name(&self) -> &str {
        "broken-startup"
    }

    fn methods(&self) -> &MethodTable {
        &self.methods
    }

    async fn startup(&self) -> Result<(), ServiceError> {
        Err(ServiceError::failed("refusing to start"))
    }
}

/// A service whose self-check always reports fatal.
pub struct FatalDiagnosis {
    methods: MethodTable,
}

impl FatalDiagnosis {
    pub fn new() -> Arc<dyn Service> {
        Arc::new(Self {
            methods: MethodTable::builder().build(),
        })
    }
}

#[async_trait]
impl Service for FatalDiagnosis {
    fn name(&self) -> &str {
        "fatal-diagnosis"
    }

    fn methods(&self) -> &MethodTable {
        &self.methods
    }

    async fn diagnose(&self) -> Diagnosis {
        Diagnosis::fatal("simulated fault")
    }
}

/// A service with a `wait` method that blocks until the returned gate is
/// notified (use `notify_one` so a permit is stored even if it fires first).
pub struct GatedService {
    methods: MethodTable,
}

impl GatedService {
    pub fn new() -> (Arc<dyn Service>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let handler_gate = Arc::clone(&gate);

        let methods = MethodTable::builder()
            .method("wait", move |_args| {
                let gate = Arc::clone(&handler_gate);
                async move {
                    gate.notified().await;
                    Ok(json!({ "released": true }))
                }
            })
            .build();

        let service: Arc<dyn Service> = Arc::new(Self { methods });

        (service, gate)
    }
}

#[async_trait]
impl Service for GatedService {
    fn name(&self) -> &str {
        "gated"
    }

    fn methods(&self) -> &MethodTable {
        &self.methods
    }
}
