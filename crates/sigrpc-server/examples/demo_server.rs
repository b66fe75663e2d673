//! Serves a small `demo` service.
//!
//! ```bash
//! cargo run -p sigrpc-server --example demo_server -- --bind 127.0.0.1:9001
//! cargo run -p sigrpc-server --example demo_server -- --unix /tmp/sigrpc-demo.sock
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use argh::FromArgs;
use serde::{Deserialize, Serialize};
use sigrpc_common::ObjList;
use sigrpc_server::{Endpoint, FunctionRegistry, RpcServer, ServerConfig, ServiceError};

#[derive(FromArgs)]
/// SigRPC demo server
struct Args {
    /// TCP address to bind (default: 127.0.0.1:9001)
    #[argh(option, short = 'b', default = "String::from(\"127.0.0.1:9001\")")]
    bind: String,

    /// serve on a Unix socket at this path instead of TCP
    #[argh(option, short = 'u')]
    unix: Option<PathBuf>,

    /// maximum connections served at once
    #[argh(option, short = 'c')]
    max_connections: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Repo {
    id: Option<String>,
    name: Option<String>,
    size: i64,
}

fn demo_registry() -> Result<FunctionRegistry> {
    let mut registry = FunctionRegistry::with_default_marshals()?;
    registry.create_service("demo");

    registry.register_function("demo", "add", |a: i32, b: i32| -> Result<i32, ServiceError> {
        a.checked_add(b)
            .ok_or_else(|| ServiceError::new(100, "integer overflow"))
    })?;

    registry.register_function(
        "demo",
        "get_substring",
        |s: String, start: i32| -> Result<Option<String>, ServiceError> {
            if start < 0 {
                return Err(ServiceError::new(101, "start must not be negative"));
            }
            Ok(Some(s.chars().skip(start as usize).collect()))
        },
    )?;

    registry.register_function("demo", "echo", |s: Option<String>| -> Result<Option<String>, ServiceError> {
        Ok(s)
    })?;

    registry.register_function(
        "demo",
        "list_repos",
        |owner: String, count: i32| -> Result<ObjList<Repo>, ServiceError> {
            let repos = (0..count.max(0))
                .map(|i| Repo {
                    id: Some(format!("{}/repo-{}", owner, i)),
                    name: Some(format!("repo-{}", i)),
                    size: i64::from(i) * 100,
                })
                .collect();
            Ok(ObjList(repos))
        },
    )?;

    Ok(registry)
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Args = argh::from_env();

    let endpoint = match args.unix {
        #[cfg(unix)]
        Some(path) => Endpoint::Unix(path),
        #[cfg(not(unix))]
        Some(_) => anyhow::bail!("Unix sockets are not supported on this platform"),
        None => Endpoint::Tcp(args.bind),
    };

    let mut config = ServerConfig::from_env();
    if let Some(max) = args.max_connections {
        config = config.with_max_connections(max);
    }

    let server = RpcServer::bind(endpoint, Arc::new(demo_registry()?), config).await?;
    tracing::info!("Serving on {}, press Ctrl-C to stop", server.local_addr());

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
