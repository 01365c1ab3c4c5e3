use crate::controller::CommandSender;
use crate::error::{ClaError, Result};
use crate::outbound::OutboundSender;
use dtn6_route::LinkId;
use std::collections::HashMap;
use std::sync::Arc;

/// What opening a contact hands back to the caller: a command channel for
/// cancel/break, and an outbound channel the bundle pipeline feeds bundles
/// into. Both drain to the same worker task the CL spawned.
pub struct Contact {
    pub commands: CommandSender,
    pub outbound: OutboundSender,
}

/// The capability record a convergence-layer implementation registers,
/// replacing the source's virtual-method hierarchy per §9's "dynamic
/// dispatch over convergence layers" design note: a name, a way to parse
/// its link-parameter options, and the handful of operations the daemon
/// needs (`open_contact`/`close_contact`/`bundle_queued`/`cancel_bundle`).
/// Interface (listener) lifecycle and link/interface dump formatting are
/// daemon/administration concerns (§1, out of scope) and are not part of
/// this trait.
#[async_trait::async_trait]
pub trait Cla: Send + Sync {
    fn name(&self) -> &'static str;

    /// Opens a contact to `nexthop` for `link`, spawning the CL's own
    /// worker task to drive the [`crate::controller::ConnectionController`]
    /// and returning the channels the caller uses to queue bundles and
    /// cancel/break the contact.
    async fn open_contact(&self, link: LinkId, nexthop: &str) -> Result<Contact>;
}

/// Name → CL table, per §4's "Convergence-layer registry" component: used
/// by link/interface creation to dispatch by name instead of a compiled-in
/// type switch.
#[derive(Default)]
pub struct ClaRegistry {
    entries: HashMap<&'static str, Arc<dyn Cla>>,
}

impl ClaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, cla: Arc<dyn Cla>) -> Result<()> {
        let name = cla.name();
        if self.entries.insert(name, cla).is_some() {
            return Err(ClaError::DuplicateCla(name.to_string()));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Cla>> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ClaError::UnknownCla(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(&'static str);

    #[async_trait::async_trait]
    impl Cla for Stub {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn open_contact(&self, _link: LinkId, _nexthop: &str) -> Result<Contact> {
            let (commands, _rx) = tokio::sync::mpsc::channel(1);
            let (outbound, _rx2) = tokio::sync::mpsc::channel(1);
            Ok(Contact { commands, outbound })
        }
    }

    #[test]
    fn lookup_and_duplicate_rejection() {
        let mut reg = ClaRegistry::new();
        reg.register(Arc::new(Stub("stcp"))).unwrap();
        assert!(reg.get("stcp").is_ok());
        assert!(reg.get("mtcp").is_err());
        assert!(reg.register(Arc::new(Stub("stcp"))).is_err());
    }
}
