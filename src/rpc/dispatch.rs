//! Marshaled dispatch: body bytes in, encoded response bytes out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::common::error::{DispatchError, HandlerError};
use crate::protocol::xmlrpc::{
    decode_call, encode_fault, encode_response, Charset, Fault, Value,
};

use super::registry::MethodRegistry;
use super::router::ExecutionRouter;

/// Capability interface consumed by the connection handler: marshaled
/// body bytes in, encoded response bytes out. The handler composes with
/// whatever implements this instead of inheriting dispatcher state.
pub trait Dispatch: Send + Sync {
    fn dispatch<'a>(&'a self, data: &'a [u8]) -> Pin<Box<dyn Future<Output = Vec<u8>> + Send + 'a>>;
}

impl Dispatch for RpcDispatcher {
    fn dispatch<'a>(&'a self, data: &'a [u8]) -> Pin<Box<dyn Future<Output = Vec<u8>> + Send + 'a>> {
        Box::pin(self.dispatch(data))
    }
}

/// Decodes a request, resolves and invokes the method, and encodes the
/// result. Every failure mode ends as a well-formed fault payload, so
/// `dispatch` itself never errors and the connection task never dies on
/// a bad request or a buggy handler.
pub struct RpcDispatcher {
    registry: Arc<MethodRegistry>,
    router: Arc<ExecutionRouter>,
    charset: Charset,
    allow_none: bool,
}

impl RpcDispatcher {
    pub fn new(
        registry: Arc<MethodRegistry>,
        router: Arc<ExecutionRouter>,
        charset: Charset,
        allow_none: bool,
    ) -> Self {
        Self {
            registry,
            router,
            charset,
            allow_none,
        }
    }

    /// Dispatch one marshaled call.
    pub async fn dispatch(&self, data: &[u8]) -> Vec<u8> {
        match self.dispatch_value(data).await {
            Ok(value) => match encode_response(&value, self.charset, self.allow_none) {
                Ok(bytes) => bytes,
                // The handler produced something the codec refuses
                // (e.g. nil without allow_none): same treatment as any
                // other unexpected failure.
                Err(e) => {
                    let err = HandlerError::unexpected(e);
                    encode_fault(&Fault::new(1, err.to_string()), self.charset)
                }
            },
            Err(HandlerError::Fault(fault)) => encode_fault(&fault, self.charset),
            Err(other) => encode_fault(&Fault::new(1, other.to_string()), self.charset),
        }
    }

    /// Decode, resolve, invoke. Errors here are still typed; `dispatch`
    /// collapses them into faults.
    async fn dispatch_value(&self, data: &[u8]) -> Result<Value, HandlerError> {
        let (method, params) = decode_call(data).map_err(HandlerError::unexpected)?;

        match self.registry.lookup(&method) {
            Some(handler) => self.router.invoke(handler, params).await,
            None => match self.registry.hook() {
                Some(hook) => hook.dispatch(&method, params).await,
                None => Err(HandlerError::unexpected(DispatchError { method })),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::xmlrpc::{decode_response, encode_call};
    use crate::rpc::registry::{DispatchHook, MethodFuture, RegistryBuilder};

    fn dispatcher(allow_none: bool) -> RpcDispatcher {
        let mut b = RegistryBuilder::new();
        b.register_sync("add", |params: Vec<Value>| {
            let a = params[0].as_i32().ok_or(Fault::new(2, "bad arg"))?;
            let b = params[1].as_i32().ok_or(Fault::new(2, "bad arg"))?;
            Ok(Value::Int(a + b))
        })
        .unwrap();
        b.register_sync("fail_fault", |_| Err(Fault::new(7, "bad").into()))
            .unwrap();
        b.register_sync("fail_plain", |_| {
            let e = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
            Err(HandlerError::unexpected(e))
        })
        .unwrap();
        b.register_async("nothing", |_| async { Ok(Value::Nil) })
            .unwrap();
        RpcDispatcher::new(
            Arc::new(b.build()),
            Arc::new(ExecutionRouter::new(None)),
            Charset::Utf8,
            allow_none,
        )
    }

    async fn call(d: &RpcDispatcher, method: &str, params: &[Value]) -> Result<Value, Fault> {
        let body = encode_call(method, params, Charset::Utf8, true).unwrap();
        decode_response(&d.dispatch(&body).await).unwrap()
    }

    #[tokio::test]
    async fn add_returns_single_value() {
        let d = dispatcher(false);
        let out = call(&d, "add", &[Value::Int(2), Value::Int(3)]).await;
        assert_eq!(out.unwrap(), Value::Int(5));
    }

    #[tokio::test]
    async fn explicit_fault_passes_through_verbatim() {
        let d = dispatcher(false);
        let fault = call(&d, "fail_fault", &[]).await.unwrap_err();
        assert_eq!(fault, Fault::new(7, "bad"));
    }

    #[tokio::test]
    async fn plain_error_becomes_generic_fault() {
        let d = dispatcher(false);
        let fault = call(&d, "fail_plain", &[]).await.unwrap_err();
        assert_eq!(fault.code, 1);
        assert!(fault.message.contains("Error"), "{}", fault.message);
        assert!(fault.message.contains("disk on fire"), "{}", fault.message);
    }

    #[tokio::test]
    async fn unknown_method_is_a_fault_not_a_crash() {
        let d = dispatcher(false);
        let fault = call(&d, "no_such", &[]).await.unwrap_err();
        assert_eq!(fault.code, 1);
        assert!(fault.message.contains("is not supported"), "{}", fault.message);
    }

    #[tokio::test]
    async fn undecodable_body_is_a_fault() {
        let d = dispatcher(false);
        let fault = decode_response(&d.dispatch(b"this is not xml").await)
            .unwrap()
            .unwrap_err();
        assert_eq!(fault.code, 1);
        assert!(fault.message.contains("CodecError"), "{}", fault.message);
    }

    #[tokio::test]
    async fn nil_result_respects_allow_none() {
        let strict = dispatcher(false);
        let fault = call(&strict, "nothing", &[]).await.unwrap_err();
        assert_eq!(fault.code, 1);

        let lax = dispatcher(true);
        assert_eq!(call(&lax, "nothing", &[]).await.unwrap(), Value::Nil);
    }

    #[tokio::test]
    async fn hook_sees_unresolved_names_only() {
        struct Echo;
        impl DispatchHook for Echo {
            fn dispatch(&self, method: &str, params: Vec<Value>) -> MethodFuture {
                let method = method.to_string();
                Box::pin(async move {
                    let mut out = vec![Value::Str(method)];
                    out.extend(params);
                    Ok(Value::Array(out))
                })
            }
        }

        let mut b = RegistryBuilder::new();
        b.register_sync("add", |_| Ok(Value::Int(0))).unwrap();
        b.dispatch_hook(Arc::new(Echo));
        let d = RpcDispatcher::new(
            Arc::new(b.build()),
            Arc::new(ExecutionRouter::new(None)),
            Charset::Utf8,
            false,
        );

        // Registered name: the map wins, the hook is not consulted.
        assert_eq!(call(&d, "add", &[]).await.unwrap(), Value::Int(0));

        // Unresolved name: delegated entirely to the hook.
        let out = call(&d, "mystery", &[Value::Int(4)]).await.unwrap();
        assert_eq!(
            out,
            Value::Array(vec![Value::Str("mystery".into()), Value::Int(4)])
        );
    }
}
