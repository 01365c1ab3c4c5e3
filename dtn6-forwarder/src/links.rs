//! Wires the configured CLA engines into a [`ClaRegistry`], opens a
//! contact for each configured link, and populates the route table from
//! the configured static entries. This is the minimal slice of §6's
//! `link add`/`interface add`/route administration the core binary needs
//! to stand a forwarder up; a TCL console or dynamic `link add` command
//! surface is out of scope (§1).

use crate::config::{ClaConfig, Config, LinkConfig, RouteNextHop};
use anyhow::{anyhow, Context, Result};
use dtn6_cla::link::{Link, LinkState};
use dtn6_cla::mtcp::cla::MtcpCla;
use dtn6_cla::stcp::cla::StcpCla;
use dtn6_cla::tcpclv3::cla::TcpclV3Cla;
use dtn6_cla::tcpclv4::cla::TcpclV4Cla;
use dtn6_cla::{ClaRegistry, Contact, EventSender};
use dtn6_bpv6::{BlockFramework, PayloadStore};
use dtn6_route::{LinkId, NextHop, RouteEntry, RouteTable};
use std::collections::HashMap;
use std::sync::Arc;

/// One opened link: its bookkeeping state plus the channels its CL worker
/// handed back from `open_contact`.
pub struct OpenLink {
    pub link: Link,
    pub contact: Contact,
}

/// Everything [`crate::main`] needs to hold onto for the life of the
/// process: the registry (kept alive only for its `Arc<dyn Cla>` strong
/// references), the opened links, and the shared route table.
pub struct Forwarder {
    pub routes: Arc<RouteTable>,
    pub links: HashMap<LinkId, OpenLink>,
}

fn build_registry(
    config: &Config,
    events: EventSender,
    payload_store: Arc<PayloadStore>,
    framework: Arc<BlockFramework>,
) -> Result<ClaRegistry> {
    let mut registry = ClaRegistry::new();
    for cla in &config.clas {
        let cla: Arc<dyn dtn6_cla::Cla> = match cla {
            ClaConfig::TcpclV3(cfg) => Arc::new(TcpclV3Cla::new(
                config.local_eid.clone(),
                cfg.clone(),
                events.clone(),
                payload_store.clone(),
                framework.clone(),
            )),
            ClaConfig::TcpclV4(cfg) => Arc::new(TcpclV4Cla::new(
                cfg.clone(),
                events.clone(),
                payload_store.clone(),
                framework.clone(),
            )),
            ClaConfig::Stcp(cfg) => Arc::new(StcpCla::new(
                cfg.clone(),
                events.clone(),
                payload_store.clone(),
                framework.clone(),
            )),
            ClaConfig::Mtcp(cfg) => Arc::new(MtcpCla::new(
                cfg.clone(),
                events.clone(),
                payload_store.clone(),
                framework.clone(),
            )),
        };
        registry
            .register(cla)
            .map_err(|e| anyhow!("failed to register convergence layer: {e}"))?;
    }
    Ok(registry)
}

async fn open_links(
    registry: &ClaRegistry,
    configs: &[LinkConfig],
) -> Result<HashMap<LinkId, OpenLink>> {
    let mut links = HashMap::new();
    for cfg in configs {
        let id = LinkId::from(cfg.name.as_str());
        let cla = registry
            .get(&cfg.cla)
            .with_context(|| format!("link '{}' names unknown convergence layer '{}'", cfg.name, cfg.cla))?;

        let mut link = Link::new(id.clone(), cfg.link_type, cfg.nexthop.clone(), cfg.cla.clone());
        link.limits = cfg.limits;
        link.state = LinkState::Opening;

        let contact = cla
            .open_contact(id.clone(), &cfg.nexthop)
            .await
            .with_context(|| format!("failed to open contact for link '{}'", cfg.name))?;
        link.state = LinkState::Open;

        links.insert(id, OpenLink { link, contact });
    }
    Ok(links)
}

async fn build_routes(configs: &[crate::config::RouteConfig]) -> Result<RouteTable> {
    let table = RouteTable::new();
    for route in configs {
        let next_hop = match &route.next_hop {
            RouteNextHop::Link { link } => NextHop::Link(LinkId::from(link.as_str())),
            RouteNextHop::Alias { alias } => NextHop::Alias(alias.clone()),
        };
        table
            .add_entry(RouteEntry {
                dest_pattern: route.pattern.clone(),
                next_hop,
            })
            .await
            .map_err(|e| anyhow!("failed to add route entry: {e}"))?;
    }
    Ok(table)
}

/// Registers every configured CLA, opens every configured link, and loads
/// the static route table. Returns once every link has either opened or
/// failed to open — an always-on link that cannot be reached at startup
/// fails the whole call, matching a config error in §6 rather than the
/// reconnect-backoff retry policy link administration would otherwise
/// apply (§1, out of scope).
pub async fn init(config: &Config, events: EventSender) -> Result<Forwarder> {
    let payload_store = Arc::new(PayloadStore::new(config.payload_store_limit));
    let framework = Arc::new(BlockFramework::with_defaults());
    let registry = build_registry(config, events, payload_store, framework)?;
    let links = open_links(&registry, &config.links).await?;
    let routes = build_routes(&config.routes).await?;
    Ok(Forwarder {
        routes: Arc::new(routes),
        links,
    })
}
