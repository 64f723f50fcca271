// Copyright 2024 The farcall contributors
// This file is part of the farcall library.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:

// http://www.apache.org/licenses/LICENSE-2.0

// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use farcall::{
    messages::{InvocationRequest, InvocationResponse, Request, Response},
    service::Config,
    ChannelPool, HostService,
};

use std::{sync::Arc, time::Duration};

/// Routes library tracing to the test output; respects `RUST_LOG`.
pub fn initialize_logger() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt().with_env_filter(EnvFilter::from_default_env()).with_test_writer().try_init();
}

/// A config with short deadlines, so failing scenarios converge quickly.
pub fn test_config() -> Config {
    initialize_logger();
    Config {
        dial_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Encodes a test integer the way the scenarios marshal values.
pub fn encode_value(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Decodes a test integer produced by `encode_value`.
pub fn decode_value(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_be_bytes(raw)
}

/// Starts a service whose root object answers the selector `answer` with 42
/// and echoes any `echo` payload back.
pub async fn start_answer_service(config: Config, pool: Arc<ChannelPool>) -> Arc<HostService> {
    let service = HostService::new(Arc::new(42u64), config, pool).await.unwrap();

    service.executor().register_handler("Invocation", |request, context| async move {
        let Request::Invocation(invocation) = request else {
            anyhow::bail!("mismatched request kind");
        };
        answer_invocation(&invocation, &context)
    });

    service
}

fn answer_invocation(
    invocation: &InvocationRequest,
    context: &Arc<farcall::ServiceContext>,
) -> anyhow::Result<Response> {
    let Some(object) = context.objects().get(invocation.target) else {
        anyhow::bail!("no object at address {}", invocation.target);
    };
    let answer = *object.downcast::<u64>().map_err(|_| anyhow::anyhow!("the target is not an integer"))?;

    match invocation.selector.as_deref() {
        Some("answer") => {
            Ok(Response::Invocation(InvocationResponse::new(invocation, Some(encode_value(answer)), vec![])))
        }
        Some("echo") => {
            Ok(Response::Invocation(InvocationResponse::new(invocation, Some(invocation.arguments.clone()), vec![])))
        }
        selector => anyhow::bail!("unknown selector {selector:?}"),
    }
}
