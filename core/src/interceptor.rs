//! Observers invoked around every transport call.
//!
//! Hooks run synchronously on the calling task, in registration order.
//! `on_request` may rewrite the request before it is sent; `on_response`
//! sees the same request together with the response head, whatever the
//! status. Calls that never produce a response (connection refused,
//! timeout, cancellation) skip `on_response`.

use std::fmt;
use std::sync::Arc;

use crate::http::{HttpRequest, ResponseHead};

/// Request/response hook pair. Both hooks default to no-ops.
///
/// Concurrent calls through one client may invoke the same interceptor
/// from several tasks at once.
pub trait Interceptor: Send + Sync {
    fn on_request(&self, _request: &mut HttpRequest) {}

    fn on_response(&self, _request: &HttpRequest, _response: &ResponseHead) {}
}

/// Ordered collection of interceptors.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub(crate) fn before_send(&self, request: &mut HttpRequest) {
        for interceptor in &self.interceptors {
            interceptor.on_request(request);
        }
    }

    pub(crate) fn after_receive(&self, request: &HttpRequest, response: &ResponseHead) {
        for interceptor in &self.interceptors {
            interceptor.on_response(request, response);
        }
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

/// Logs each exchange through `tracing`. Headers and bodies are never logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn on_request(&self, request: &mut HttpRequest) {
        tracing::debug!(target: "httwrap::http", method = %request.method, url = %request.url, "sending request");
    }

    fn on_response(&self, request: &HttpRequest, response: &ResponseHead) {
        tracing::debug!(
            target: "httwrap::http",
            method = %request.method,
            url = %request.url,
            status = response.status,
            "response received"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tracing_test::traced_test;

    use super::*;
    use crate::http::HttpMethod;

    struct Tagger {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for Tagger {
        fn on_request(&self, request: &mut HttpRequest) {
            self.log.lock().unwrap().push(format!("{}:request", self.name));
            let trail = request.header("X-Trail").unwrap_or_default().to_string();
            request.set_header("X-Trail", format!("{trail}{}", self.name));
        }

        fn on_response(&self, _request: &HttpRequest, response: &ResponseHead) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:response:{}", self.name, response.status));
        }
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = InterceptorChain::new();
        chain.add(Arc::new(Tagger { name: "a", log: log.clone() }));
        chain.add(Arc::new(Tagger { name: "b", log: log.clone() }));

        let mut request = HttpRequest::new(HttpMethod::Get, "http://localhost/api/products");
        chain.before_send(&mut request);
        chain.after_receive(&request, &ResponseHead::new(500));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:request", "b:request", "a:response:500", "b:response:500"]
        );
        assert_eq!(request.header("x-trail"), Some("ab"));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn empty_chain_leaves_request_untouched() {
        let chain = InterceptorChain::new();
        let mut request = HttpRequest::new(HttpMethod::Delete, "http://localhost/api/products/1");
        let before = request.clone();
        chain.before_send(&mut request);
        assert!(chain.is_empty());
        assert_eq!(request, before);
    }

    #[traced_test]
    #[test]
    fn logging_interceptor_reports_method_url_and_status() {
        let mut request = HttpRequest::new(HttpMethod::Get, "http://localhost/api/products");
        request.set_header("Authorization", "Bearer do-not-log");
        LoggingInterceptor.on_request(&mut request);
        LoggingInterceptor.on_response(&request, &ResponseHead::new(404));

        assert!(logs_contain("sending request"));
        assert!(logs_contain("status=404"));
        assert!(logs_contain("http://localhost/api/products"));
        assert!(!logs_contain("do-not-log"));
    }
}
