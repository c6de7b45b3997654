//! Route dynamic pads to branches by media type.
//!
//! Demuxers create their src pads while running. A [`PadRouter`] decides
//! where each new pad goes by looking at the name of its caps (`audio/...`,
//! `video/...`) and links it to the sink pad registered for that prefix.
//! Routing is idempotent: a second pad of the same type, or the same pad
//! announced twice, is ignored once the branch is linked.

use crate::element::{Element, Pad, PadDirection, SignalHandlerId};
use crate::error::LinkError;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// What happened to a pad given to [`PadRouter::route`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Linked to the branch registered for `media_type`.
    Linked {
        /// Name of the pad's caps.
        media_type: String,
    },
    /// The branch for this type is already linked.
    AlreadyLinked,
    /// No branch accepts this type.
    Unrouted {
        /// Name of the pad's caps, or `None` without caps.
        media_type: Option<String>,
    },
    /// Not a src pad.
    Ignored,
    /// The link was refused.
    Failed(LinkError),
}

struct Route {
    prefix: String,
    target: Pad,
}

/// Links new src pads to sink pads by caps media-type prefix.
///
/// ```rust
/// use padflow::pipeline::{PadRouter, RouteOutcome};
/// use padflow::element::{Pad, PadDirection};
///
/// let target = Pad::new("sink", PadDirection::Sink);
/// let router = PadRouter::new().with_route("audio/", &target);
/// let pad = Pad::new("src_0", PadDirection::Src);
/// // No caps yet: the router cannot classify the pad.
/// assert_eq!(router.route(&pad), RouteOutcome::Unrouted { media_type: None });
/// ```
#[derive(Clone, Default)]
pub struct PadRouter {
    routes: Arc<Mutex<Vec<Route>>>,
}

impl PadRouter {
    /// A router without routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send pads whose caps name starts with `prefix` to `target`.
    pub fn with_route(self, prefix: &str, target: &Pad) -> Self {
        self.routes.lock().unwrap().push(Route {
            prefix: prefix.to_string(),
            target: target.clone(),
        });
        self
    }

    /// Route every pad `element` adds from now on.
    pub fn attach(&self, element: &Element) -> SignalHandlerId {
        let router = self.clone();
        element.connect_pad_added(move |element, pad| {
            info!(
                pad = %pad.name(),
                element = %element.name(),
                "received new pad"
            );
            let outcome = router.route(pad);
            debug!(pad = %pad.debug_name(), ?outcome, "routed pad");
        })
    }

    /// Link `pad` to its branch if it has one and the branch is free.
    pub fn route(&self, pad: &Pad) -> RouteOutcome {
        if pad.direction() != PadDirection::Src {
            return RouteOutcome::Ignored;
        }
        let caps = pad.current_caps().unwrap_or_else(|| pad.query_caps(None));
        let Some(structure) = caps.structure(0) else {
            return RouteOutcome::Unrouted { media_type: None };
        };
        let media_type = structure.name().to_string();
        let target = {
            let routes = self.routes.lock().unwrap();
            routes
                .iter()
                .find(|r| structure.has_name_prefix(&r.prefix))
                .map(|r| r.target.clone())
        };
        let Some(target) = target else {
            return RouteOutcome::Unrouted {
                media_type: Some(media_type),
            };
        };
        if target.is_linked() {
            return RouteOutcome::AlreadyLinked;
        }
        match pad.link(&target) {
            Ok(()) => RouteOutcome::Linked { media_type },
            // Another pad won the race for the same branch.
            Err(LinkError::WasLinked) if target.is_linked() => RouteOutcome::AlreadyLinked,
            Err(err) => RouteOutcome::Failed(err),
        }
    }
}
