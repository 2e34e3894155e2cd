// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP bulk fetch used for seeding and fallback polling.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;

use super::{Poller, TransportError};
use crate::protocol::{parse_bulk, BulkSnapshot};

/// Fetches the complete population from `GET {api_url}/entities`.
#[derive(Debug, Clone)]
pub struct HttpPoller {
    client: Client,
    url: String,
}

impl HttpPoller {
    /// Create a poller for the given API base URL.
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: entities_url(api_url),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Poller for HttpPoller {
    fn fetch(&self) -> impl Future<Output = Result<BulkSnapshot, TransportError>> + Send {
        let request = self.client.get(&self.url);
        async move {
            let body = request.send().await?.error_for_status()?.bytes().await?;
            Ok(parse_bulk(&body)?)
        }
    }
}

fn entities_url(api_url: &str) -> String {
    format!("{}/entities", api_url.trim_end_matches('/'))
}
