/// Implements `RpcFunction::signature`, either from explicit types or inferred
/// from the `Domain` and `Range` associated types.
#[macro_export]
macro_rules! signature {
    ($domain:expr => $range:expr) => {
        fn signature(&self) -> $crate::Signature {
            $crate::Signature {
                domain: $domain,
                range: $range,
            }
        }
    };
    (infer) => {
        fn signature(&self) -> $crate::Signature {
            $crate::Signature::infer::<Self::Domain, Self::Range>()
        }
    };
}

/// Implements `RpcFunction::call` and its `Domain`/`Range` types from an
/// `async fn`. A function without an argument takes [`Value::Nil`](crate::Value).
///
/// ```
/// use rpcforward::{call, name, signature, FunctionCatalog, RpcFunction, Value};
///
/// struct Greet;
///
/// impl RpcFunction for Greet {
///     name!("greet");
///     signature!(infer);
///     call! {
///         async fn call(&self, who: String) -> String {
///             format!("Hello, {who}!")
///         }
///     }
/// }
///
/// struct Uptime;
///
/// impl RpcFunction for Uptime {
///     name!("uptime");
///     signature!(infer);
///     call! {
///         async fn call(&self) -> i64 {
///             42
///         }
///     }
/// }
///
/// let mut catalog = FunctionCatalog::new();
/// catalog.add(Greet);
/// catalog.add(Uptime);
/// futures::executor::block_on(async {
///     let greeting = catalog.call("greet", "peer".into()).await.unwrap();
///     assert_eq!(greeting, Value::from("Hello, peer!"));
///     assert_eq!(catalog.call("uptime", Value::Nil).await.unwrap(), Value::Int(42));
/// });
/// ```
#[macro_export]
macro_rules! call {
    (async fn call(& $self:ident) -> $range_ty:ty { $($body:tt)* }) => {
        $crate::call! {
            async fn call(&$self, _nil: ()) -> $range_ty { $($body)* }
        }
    };
    (async fn call(& $self:ident, $domain_ident:ident : $domain_ty:ty) -> $range_ty:ty { $($body:tt)* }) => {
        type Domain = $domain_ty;
        type Range = $range_ty;

        fn call<'call>(&'call $self, $domain_ident: $domain_ty) -> $crate::BoxFuture<'call, Self::Range> {
            Box::pin(async move { $($body)* })
        }
    };
}

/// Implements `RpcFunction::name`. Chain definitions and `name>destination`
/// hops refer to the function by this name.
#[macro_export]
macro_rules! name {
    ($name:expr) => {
        fn name(&self) -> &str {
            $name
        }
    };
}
