pub mod cachecontrol;
pub mod cachestrategy;
pub mod contentdecoder;
pub mod engine;
pub mod http1transport;
pub mod httpcache;
pub mod httpdate;
pub mod orderedheaders;
pub mod request;
pub mod requestbody;
pub mod response;
pub mod responsebody;
pub mod transport;

// Re-exports for convenience
pub use cachestrategy::{CacheDecision, CacheStrategy};
pub use engine::{EngineContext, EngineState, HttpEngine};
pub use http1transport::Http1Transport;
pub use httpcache::{CacheMode, CacheSink, CacheStats, CachedResponse, HttpCache, ResponseCache};
pub use orderedheaders::OrderedHeaderMap;
pub use request::{BodyMode, CachePolicy, HttpRequest};
pub use requestbody::{RequestBody, RequestBodySink};
pub use response::{HttpResponse, ResponseHead, ResponseSource, StatusLine, TlsHandshake};
pub use responsebody::ResponseBody;
pub use transport::{TransferSource, TransferStream, Transport};
