//! Realtime Change Feed
//!
//! Pushes bookmark inserts and deletes to the owner's open sessions over a
//! websocket.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: active connections, their channels, owner-scoped publish
//! - **Handler**: `/ws` upgrade (signed-in users only) and frame handling
//! - **Messages**: client and server frame formats, change payloads
//!
//! ## Example
//!
//! ```javascript
//! // Browser, with the session cookie already set
//! const ws = new WebSocket('ws://localhost:3000/ws');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({
//!     type: 'subscribe',
//!     channel: 'bookmarks',
//!     table: 'bookmarks',
//!     event: '*',
//!     filter: `user_id=eq.${userId}`,
//!   }));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'change') console.log(msg.payload.event_type, msg.payload);
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{ConnectionHub, ConnectionId, HubConfig, HubError};
pub use messages::{
    owner_filter, owner_topic, parse_owner_filter, BookmarkRef, ChangeEvent, ClientMessage,
    EventFilter, ServerMessage, BOOKMARKS_TABLE,
};
