use crate::{
    definition::{parse_hop, split_chain},
    types::{Decode, Encode, Type, TypeMismatch, Value},
    RpcFunction, Signature,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::debug;

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";

/// Content type used when none is configured: text for functions producing
/// strings, JSON for everything else.
pub fn default_content_type(output: &Type) -> &'static str {
    if output.is_textual() {
        TEXT_PLAIN
    } else {
        APPLICATION_JSON
    }
}

/// A type-erased version of [`RpcFunction`]. Safe to call concurrently.
pub trait DynamicFunction: Send + Sync {
    fn name(&self) -> &str;
    fn signature(&self) -> &Signature;
    fn call(&self, args: Value) -> BoxFuture<'_, Result<Value, CallError>>;
}

pub type Callable = Arc<dyn DynamicFunction>;

/// Lookup and registration of callables by name.
pub trait FunctionRegistry {
    fn lookup(&self, name: &str) -> Option<Callable>;
    fn register(&mut self, name: &str, function: Callable);
}

/// Maps function names to [`Callable`]s.
///
/// Functions are added with [`add`](Self::add) or
/// [`register`](FunctionRegistry::register) and resolved by name or by chain
/// definition with [`lookup_definition`](Self::lookup_definition).
#[derive(Default, Clone)]
pub struct FunctionCatalog {
    functions: BTreeMap<String, Callable>,
}

impl FunctionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<RFn>(&mut self, rpc_function: RFn)
    where
        RFn: RpcFunction + Send + Sync + 'static,
        RFn::Domain: Send,
    {
        let signature = rpc_function.signature();
        let typed = TypedRpcFunction {
            rpc_function,
            signature,
        };
        let name = typed.name().to_owned();
        self.functions.insert(name, Arc::new(typed));
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.functions.keys().map(String::as_str)
    }

    pub fn functions(&self) -> Vec<FunctionInfo> {
        self.functions
            .iter()
            .map(|(name, function)| FunctionInfo {
                name: name.clone(),
                signature: function.signature().clone(),
            })
            .collect()
    }

    /// Resolves a chain definition such as `upper|reverse` into one callable.
    /// Each hop is looked up by its local name; a hop's destination does not
    /// take part in the lookup.
    pub fn lookup_definition(&self, definition: &str) -> Option<Callable> {
        let mut stages = Vec::new();
        for token in split_chain(definition) {
            let hop = match parse_hop(token) {
                Ok(hop) => hop,
                Err(error) => {
                    debug!(definition, %error, "unparsable function definition");
                    return None;
                }
            };
            stages.push(self.lookup(hop.local_name())?);
        }
        match stages.len() {
            0 => None,
            1 => stages.pop(),
            _ => Some(Arc::new(ComposedFunction::new(stages))),
        }
    }

    /// Like [`lookup_definition`](Self::lookup_definition), tagging the result
    /// with the content type its output should be rendered as.
    pub fn lookup_accepting(&self, definition: &str, accept: &str) -> Option<ResolvedFunction> {
        self.lookup_definition(definition)
            .map(|function| ResolvedFunction::new(function, accept))
    }

    pub async fn call(&self, definition: &str, args: Value) -> CallResult {
        Ok(self
            .lookup_definition(definition)
            .ok_or_else(|| DispatchError::NoSuchFunction(definition.to_owned()))?
            .call(args)
            .await?)
    }
}

impl FunctionRegistry for FunctionCatalog {
    fn lookup(&self, name: &str) -> Option<Callable> {
        self.functions.get(name).cloned()
    }

    fn register(&mut self, name: &str, function: Callable) {
        self.functions.insert(name.to_owned(), function);
    }
}

pub type CallResult = Result<Value, DispatchError>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    pub signature: Signature,
}

/// A callable together with the content type negotiated for its output.
#[derive(Clone)]
pub struct ResolvedFunction {
    function: Callable,
    content_type: String,
}

impl ResolvedFunction {
    pub fn new(function: Callable, content_type: impl Into<String>) -> Self {
        Self {
            function,
            content_type: content_type.into(),
        }
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn function(&self) -> &Callable {
        &self.function
    }

    pub async fn call(&self, args: Value) -> Result<Value, CallError> {
        self.function.call(args).await
    }
}

struct TypedRpcFunction<RFn>
where
    RFn: RpcFunction + Send + Sync,
    RFn::Domain: Send,
{
    rpc_function: RFn,
    signature: Signature,
}

impl<RFn> TypedRpcFunction<RFn>
where
    RFn: RpcFunction + Send + Sync,
    RFn::Domain: Send,
{
    async fn call(&self, args: Value) -> Result<Value, CallError> {
        let Signature { domain, range } = &self.signature;
        domain.check(&args).map_err(CallError::Domain)?;
        let decoded_args = RFn::Domain::decode(args).map_err(CallError::Domain)?;
        let retval = RFn::Range::encode(self.rpc_function.call(decoded_args).await);
        range.check(&retval).map_err(CallError::Range)?;
        Ok(retval)
    }
}

impl<RFn> DynamicFunction for TypedRpcFunction<RFn>
where
    RFn: RpcFunction + Send + Sync,
    RFn::Domain: Send,
{
    fn name(&self) -> &str {
        self.rpc_function.name()
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, args: Value) -> BoxFuture<'_, Result<Value, CallError>> {
        Box::pin(self.call(args))
    }
}

/// Feeds the output of each stage into the next.
struct ComposedFunction {
    name: String,
    signature: Signature,
    stages: Vec<Callable>,
}

impl ComposedFunction {
    /// `stages` must not be empty.
    fn new(stages: Vec<Callable>) -> Self {
        let name = stages
            .iter()
            .map(|stage| stage.name())
            .collect::<Vec<_>>()
            .join("|");
        let domain = stages
            .first()
            .map_or(Type::Any, |stage| stage.signature().domain.clone());
        let range = stages
            .last()
            .map_or(Type::Any, |stage| stage.signature().range.clone());
        Self {
            name,
            signature: Signature { domain, range },
            stages,
        }
    }
}

impl DynamicFunction for ComposedFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, args: Value) -> BoxFuture<'_, Result<Value, CallError>> {
        Box::pin(async move {
            let mut value = args;
            for stage in &self.stages {
                value = stage.call(value).await?;
            }
            Ok(value)
        })
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no function named '{0}'")]
    NoSuchFunction(String),

    #[error("calling function: {0}")]
    CallError(#[from] CallError),
}

#[derive(Error, Debug)]
pub enum CallError {
    #[error("domain type mismatch: {0}")]
    Domain(TypeMismatch),

    #[error("(BUG in RPC function) range type mismatch: {0}")]
    Range(TypeMismatch),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{call, from_fn, name, signature};

    struct Shout;

    impl RpcFunction for Shout {
        name!("shout");
        signature!(infer);
        call! {
            async fn call(&self, text: String) -> String {
                format!("{}!", text.to_uppercase())
            }
        }
    }

    struct Liar;

    impl RpcFunction for Liar {
        name!("liar");
        signature!(Type::Any => Type::Int);
        call! {
            async fn call(&self, _args: Value) -> Value {
                Value::from("not an int")
            }
        }
    }

    fn catalog() -> FunctionCatalog {
        let mut catalog = FunctionCatalog::new();
        catalog.add(Shout);
        catalog.add(Liar);
        catalog.add(from_fn("len", |s: String| s.len() as i64));
        catalog.add(from_fn("double", |n: i64| n * 2));
        catalog
    }

    #[tokio::test]
    async fn calls_by_name() {
        let catalog = catalog();
        let retval = catalog.call("shout", "hey".into()).await.unwrap();
        assert_eq!(retval, Value::from("HEY!"));
        assert!(matches!(
            catalog.call("missing", Value::Nil).await,
            Err(DispatchError::NoSuchFunction(name)) if name == "missing"
        ));
    }

    #[tokio::test]
    async fn type_checks_both_ends() {
        let catalog = catalog();
        assert!(matches!(
            catalog.call("shout", Value::Int(1)).await,
            Err(DispatchError::CallError(CallError::Domain(_)))
        ));
        assert!(matches!(
            catalog.call("liar", Value::Nil).await,
            Err(DispatchError::CallError(CallError::Range(_)))
        ));
    }

    #[tokio::test]
    async fn composes_chain_definitions() {
        let catalog = catalog();
        let composed = catalog.lookup_definition("shout|len, double").unwrap();
        assert_eq!(composed.name(), "shout|len|double");
        assert_eq!(
            composed.signature(),
            &Signature {
                domain: Type::String,
                range: Type::Int
            }
        );
        assert_eq!(composed.call("abc".into()).await.unwrap(), Value::Int(8));
    }

    #[test]
    fn composition_ignores_destinations_and_needs_every_hop() {
        let catalog = catalog();
        let single = catalog.lookup_definition("len>host:1").unwrap();
        assert_eq!(single.name(), "len");
        assert!(catalog.lookup_definition("len|nope").is_none());
        assert!(catalog.lookup_definition("len>a>b").is_none());
        assert!(catalog.lookup_definition(" | ").is_none());
    }

    #[test]
    fn registering_replaces_by_name() {
        let mut catalog = catalog();
        let double = catalog.lookup("double").unwrap();
        catalog.register("len", double);
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.lookup("len").unwrap().name(), "double");
        assert_eq!(
            catalog.names().collect::<Vec<_>>(),
            vec!["double", "len", "liar", "shout"]
        );
    }

    #[test]
    fn lists_functions_with_signatures() {
        let info = catalog().functions();
        let len = info.iter().find(|f| f.name == "len").unwrap();
        assert_eq!(len.signature, Signature::infer::<String, i64>());
    }

    #[test]
    fn default_content_type_follows_output_type() {
        assert_eq!(default_content_type(&Type::String), TEXT_PLAIN);
        assert_eq!(default_content_type(&Type::Int), APPLICATION_JSON);
        let resolved = catalog().lookup_accepting("shout", "text/csv").unwrap();
        assert_eq!(resolved.content_type(), "text/csv");
        assert_eq!(resolved.name(), "shout");
    }
}
