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

//! Websocket push connector.

use std::future::{ready, Future};

use futures_util::stream::{BoxStream, StreamExt};
use log::debug;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::{Connector, TransportError};

/// Opens websocket connections to the snapshot feed.
///
/// Text and binary frames are passed on as raw payloads; control frames are
/// handled by the websocket layer and never reach the parser.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WsConnector {
    type Frames = BoxStream<'static, Result<Vec<u8>, TransportError>>;

    fn connect(&self) -> impl Future<Output = Result<Self::Frames, TransportError>> + Send {
        let url = self.url.clone();
        async move {
            let (ws_stream, response) = connect_async(url.as_str()).await?;
            debug!("Websocket handshake with {} returned {}", url, response.status());

            let frames = ws_stream
                .filter_map(|msg| {
                    ready(match msg {
                        Ok(Message::Text(text)) => Some(Ok(text.as_bytes().to_vec())),
                        Ok(Message::Binary(data)) => Some(Ok(data.to_vec())),
                        Ok(_) => None,
                        Err(e) => Some(Err(TransportError::from(e))),
                    })
                })
                .boxed();

            Ok(frames)
        }
    }
}
