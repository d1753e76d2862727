//! One logical request: auth retries and redirect hops around a transport.

use crate::auth::{AuthManager, AuthScope};
use crate::transport::redirect::{self, RedirectAction};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;
use vfsd_backend::JobContext;

/// Sends requests for one mount.
pub struct DavSession {
    transport: Arc<dyn HttpTransport>,
    auth: AuthManager,
    max_redirects: usize,
}

impl DavSession {
    pub fn new(transport: Arc<dyn HttpTransport>, auth: AuthManager, max_redirects: usize) -> Self {
        Self {
            transport,
            auth,
            max_redirects,
        }
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    /// Sends `request` until a final response arrives or the job is cancelled.
    ///
    /// A 3xx that is not followed comes back as a normal response.
    pub async fn send(
        &self,
        job: &JobContext,
        request: HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        tokio::select! {
            biased;
            _ = job.cancellation().cancelled() => Err(TransportError::Cancelled),
            result = self.send_inner(request) => result,
        }
    }

    async fn send_inner(&self, mut request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut redirects = 0usize;
        let mut visited = HashSet::new();
        visited.insert((request.method, request.url.to_string()));

        loop {
            self.auth.apply(&request.url, &mut request.headers)?;
            let mut response = self.transport.execute(&request).await?;

            if let Some(scope) = AuthScope::for_status(response.status) {
                let retrying = request.headers.contains_key(scope.credentials_header());
                match self
                    .auth
                    .respond(scope, &response.headers, &request.url, retrying)
                    .await?
                {
                    Some(credentials) => {
                        response.skip().await?;
                        request
                            .headers
                            .insert(scope.credentials_header(), credentials);
                        continue;
                    }
                    None => return Ok(response),
                }
            }

            let action = redirect::classify(&request, &response)?;
            if action == RedirectAction::Stop {
                return Ok(response);
            }

            redirects += 1;
            if redirects > self.max_redirects {
                debug!("{} {}: redirect limit reached", request.method, request.url);
                return Err(TransportError::TooManyRedirects(self.max_redirects));
            }
            response.skip().await?;
            redirect::apply(&mut request, &action);
            if !visited.insert((request.method, request.url.to_string())) {
                return Err(TransportError::RedirectLoop(request.url.to_string()));
            }
        }
    }
}
