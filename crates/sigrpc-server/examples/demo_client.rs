//! Calls the `demo` service started by `demo_server`.
//!
//! ```bash
//! cargo run -p sigrpc-server --example demo_client -- --addr 127.0.0.1:9001
//! ```

use anyhow::Result;
use argh::FromArgs;
use serde::{Deserialize, Serialize};
use sigrpc_client::RpcClient;
use sigrpc_common::transport::TcpTransport;
use sigrpc_common::ObjList;

#[derive(FromArgs)]
/// SigRPC demo client
struct Args {
    /// server address (default: 127.0.0.1:9001)
    #[argh(option, short = 'a', default = "String::from(\"127.0.0.1:9001\")")]
    addr: String,

    /// number of parallel callers
    #[argh(option, short = 'n', default = "8")]
    callers: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Repo {
    id: Option<String>,
    name: Option<String>,
    size: i64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Args = argh::from_env();
    let mut client = RpcClient::new(TcpTransport::tcp(args.addr.clone()), "demo");

    let sum: i32 = client.call("add", (2, 3))?;
    println!("add(2, 3) = {}", sum);

    let tail: Option<String> = client.call("get_substring", ("hello", 2))?;
    println!("get_substring(\"hello\", 2) = {:?}", tail);

    match client.call::<Option<String>>("get_substring", ("hello", -1)) {
        Ok(v) => println!("unexpected success: {:?}", v),
        Err(e) => println!("get_substring(\"hello\", -1) failed: {}", e),
    }

    let repos: ObjList<Repo> = client.call("list_repos", ("octo", 3))?;
    for repo in repos.into_inner() {
        println!("  {:?}", repo);
    }

    // One connection per caller
    let handles: Vec<_> = (0..args.callers)
        .map(|i| {
            let addr = args.addr.clone();
            std::thread::spawn(move || -> sigrpc_common::Result<i32> {
                let mut client = RpcClient::new(TcpTransport::tcp(addr), "demo");
                client.call("add", (i, i))
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(v)) => println!("caller {}: {}", i, v),
            Ok(Err(e)) => eprintln!("caller {} failed: {}", i, e),
            Err(_) => eprintln!("caller {} panicked", i),
        }
    }

    Ok(())
}
