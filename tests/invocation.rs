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

#[allow(dead_code)]
mod common;

use crate::common::{decode_value, encode_value, start_answer_service, test_config};
use farcall::{
    messages::{InvocationRequest, InvocationResponse, Request, Response},
    ChannelPool, ClientService, Executor, HostService,
};

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

#[tokio::test(flavor = "multi_thread")]
async fn simple_round_trip() {
    let config = test_config();
    let pool = ChannelPool::new(config.pool_config());
    let service = start_answer_service(config.clone(), pool.clone()).await;
    let host_port = service.host_port();

    let client = ClientService::with_pool(config, pool.clone());
    let root = client.root_object(&host_port).await.unwrap();

    let response = root.call(Some("answer"), vec![], true).await.unwrap();
    assert_eq!(decode_value(&response.return_value.unwrap()), 42);

    // Both exchanges rode pooled channels; exactly one idles afterwards.
    assert_eq!(pool.count(&host_port), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn arguments_cross_opaquely() {
    let config = test_config();
    let pool = ChannelPool::new(config.pool_config());
    let service = start_answer_service(config.clone(), pool.clone()).await;

    let client = ClientService::with_pool(config, pool);
    let root = client.root_object(&service.host_port()).await.unwrap();

    let payload = encode_value(0xDEAD_BEEF);
    let response = root.call(Some("echo"), payload.clone(), true).await.unwrap();
    assert_eq!(response.return_value.unwrap(), payload);
}

#[tokio::test(flavor = "multi_thread")]
async fn proxies_preserve_identity() {
    let config = test_config();
    let pool = ChannelPool::new(config.pool_config());
    let service = start_answer_service(config.clone(), pool.clone()).await;

    let client = ClientService::with_pool(config, pool);
    let first = client.root_object(&service.host_port()).await.unwrap();
    let second = client.root_object(&service.host_port()).await.unwrap();

    // The same remote object round-trips to the same local proxy.
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test(flavor = "multi_thread")]
async fn nested_callback_does_not_deadlock() {
    let config = test_config();
    let pool = ChannelPool::new(config.pool_config());
    let events: Arc<Mutex<Vec<&'static str>>> = Default::default();

    // Service A: its root object answers the callback selector `g`.
    let a = HostService::new(Arc::new(()), config.clone(), pool.clone()).await.unwrap();
    {
        let events = events.clone();
        a.executor().register_handler("Invocation", move |request, _context| {
            let events = events.clone();
            async move {
                let Request::Invocation(invocation) = request else {
                    anyhow::bail!("mismatched request kind");
                };
                anyhow::ensure!(invocation.selector.as_deref() == Some("g"), "unknown selector");
                events.lock().push("g_enter");
                events.lock().push("g_exit");
                Ok(Response::Invocation(InvocationResponse::new(&invocation, Some(encode_value(7)), vec![])))
            }
        });
    }

    // Service B: handling `f` synchronously calls back into A and awaits.
    let b = HostService::new(Arc::new(()), config.clone(), pool.clone()).await.unwrap();
    {
        let events = events.clone();
        let pool = pool.clone();
        let a_host_port = a.host_port();
        let a_uuid = a.service_port().uuid().to_string();
        let a_root = a.context().root_address();
        b.executor().register_handler("Invocation", move |request, context| {
            let events = events.clone();
            let pool = pool.clone();
            let a_host_port = a_host_port.clone();
            let a_uuid = a_uuid.clone();
            async move {
                let Request::Invocation(invocation) = request else {
                    anyhow::bail!("mismatched request kind");
                };
                anyhow::ensure!(invocation.selector.as_deref() == Some("f"), "unknown selector");
                events.lock().push("f_enter");

                let executor = Executor::for_context(context.context_id()).expect("the executor is registered");
                let channel = pool.fetch(&a_host_port).await?;
                let callback = Request::Invocation(InvocationRequest::new(
                    a_root,
                    Some("g".into()),
                    vec![],
                    true,
                    a_uuid.as_str(),
                ));
                let response = executor.send_request(callback, &channel, &context, Some(Duration::from_secs(5))).await?;
                pool.release(channel);
                anyhow::ensure!(matches!(response, Response::Invocation(..)), "the callback failed");

                events.lock().push("f_exit");
                Ok(Response::Invocation(InvocationResponse::new(&invocation, None, vec![])))
            }
        });
    }

    // A calls B.f on A's own executor: B's callback `g` targets A's context,
    // which is blocked inside this very call, so it must be interleaved by
    // the executor's drain loop rather than deadlock.
    let channel = pool.fetch(&b.host_port()).await.unwrap();
    let call = Request::Invocation(InvocationRequest::new(
        b.context().root_address(),
        Some("f".into()),
        vec![],
        true,
        b.service_port().uuid(),
    ));
    let response =
        a.executor().send_request(call, &channel, a.context(), Some(Duration::from_secs(10))).await.unwrap();
    pool.release(channel);

    assert!(matches!(response, Response::Invocation(..)));
    assert_eq!(*events.lock(), vec!["f_enter", "g_enter", "g_exit", "f_exit"]);
}
