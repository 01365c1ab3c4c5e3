use dtn6_cla::link::{BackpressureLimits, LinkType};
use dtn6_cla::{mtcp, stcp, tcpclv3, tcpclv4};
use dtn6_eid::{Eid, EidPattern};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

mod log_level_serde {
    use super::*;

    pub fn serialize<S>(level: &Option<Level>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match level {
            Some(level) => serializer.serialize_some(level.as_str()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Level>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| Level::from_str(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

fn default_link_type() -> LinkType {
    LinkType::OnDemand
}

/// One of the four CL options tables of §6. Each entry registers its
/// engine once, under the name the [`dtn6_cla::registry::Cla`] impl
/// reports from `name()`; a [`LinkConfig`] then refers to it by that same
/// name rather than embedding per-link CL options.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "config")]
pub enum ClaConfig {
    #[serde(rename = "tcpclv3")]
    TcpclV3(tcpclv3::Config),

    #[serde(rename = "tcpclv4")]
    TcpclV4(tcpclv4::Config),

    #[serde(rename = "stcp")]
    Stcp(stcp::Config),

    #[serde(rename = "mtcp")]
    Mtcp(mtcp::Config),
}

/// `link add <name> <nexthop> <type> <cl-name>` of §6, minus the reconnect
/// backoff and interface-level option inheritance link administration
/// would otherwise layer on (§1, out of scope).
#[derive(Debug, Serialize, Deserialize)]
pub struct LinkConfig {
    pub name: String,
    pub nexthop: String,

    #[serde(default = "default_link_type")]
    pub link_type: LinkType,

    /// Name of the registered [`ClaConfig`] entry this link opens a
    /// contact through (`"tcpclv3"`, `"tcpclv4"`, `"stcp"`, `"mtcp"`).
    pub cla: String,

    #[serde(default)]
    pub limits: BackpressureLimits,
}

/// Where a route-table entry points, per §3/§4.6: either a terminal link
/// or a rewrite to another pattern.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum RouteNextHop {
    #[serde(rename = "link")]
    Link { link: String },

    #[serde(rename = "alias")]
    Alias { alias: EidPattern },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteConfig {
    pub pattern: EidPattern,

    #[serde(flatten)]
    pub next_hop: RouteNextHop,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    // Logging level
    #[serde(default, with = "log_level_serde")]
    pub log_level: Option<Level>,

    /// This node's own endpoint id, advertised in TCPCLv3's contact header
    /// and TCPCLv4's `SESS_INIT` node id.
    pub local_eid: Eid,

    // Convergence-layer engines to register, per §6.
    #[serde(default)]
    pub clas: Vec<ClaConfig>,

    // Statically configured links, per §6's `link add`.
    #[serde(default)]
    pub links: Vec<LinkConfig>,

    // Statically configured route-table entries, per §4.6.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    /// Process-wide ceiling on reserved payload bytes, per §5's
    /// shared-resource policy. Every CL engine's receive path draws from
    /// this one quota.
    #[serde(default = "default_payload_store_limit")]
    pub payload_store_limit: u64,
}

fn default_payload_store_limit() -> u64 {
    256 * 1024 * 1024
}

fn options() -> getopts::Options {
    let mut opts = getopts::Options::new();
    opts.optflag("h", "help", "print this help menu")
        .optflag("v", "version", "print the version information")
        .optopt("c", "config", "use a custom configuration file", "FILE");
    opts
}

pub fn config_dir() -> PathBuf {
    directories::ProjectDirs::from("dtn", "dtn6", env!("CARGO_PKG_NAME")).map_or_else(
        || {
            #[cfg(all(target_os = "linux", not(feature = "packaged-installation")))]
            return std::path::Path::new("/etc/opt").join(env!("CARGO_PKG_NAME"));

            #[cfg(all(
                unix,
                not(all(target_os = "linux", not(feature = "packaged-installation")))
            ))]
            return std::path::Path::new("/etc").join(env!("CARGO_PKG_NAME"));

            #[cfg(windows)]
            return std::env::current_exe()
                .expect("Failed to get current executable path")
                .join(env!("CARGO_PKG_NAME"));

            #[cfg(not(any(unix, windows)))]
            compile_error!("No idea how to determine default config directory for target platform");
        },
        |proj_dirs| proj_dirs.config_local_dir().to_path_buf(),
    )
}

pub fn init() -> Option<(Config, String)> {
    use trace_err::*;

    let opts = options();
    let args: Vec<String> = std::env::args().collect();
    let flags = opts
        .parse(&args[1..])
        .trace_expect("Failed to parse command line args");
    if flags.opt_present("h") {
        let brief = format!(
            "{} {} - {}\n\nUsage: {} [options]",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_DESCRIPTION"),
            args[0]
        );
        print!("{}", opts.usage(&brief));
        return None;
    }
    if flags.opt_present("v") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return None;
    }

    let mut b = ::config::Config::builder();

    let config_source: String;
    if let Some(source) = flags.opt_str("config") {
        config_source = format!("Using configuration file '{source}' specified on command line");
        b = b.add_source(::config::File::with_name(&source));
    } else if let Ok(source) = std::env::var("DTN6_FORWARDER_CONFIG_FILE") {
        config_source = format!(
            "Using configuration file '{source}' specified by DTN6_FORWARDER_CONFIG_FILE environment variable"
        );
        b = b.add_source(::config::File::with_name(&source));
    } else {
        let path = config_dir().join(format!("{}.yaml", env!("CARGO_PKG_NAME")));
        config_source = format!("Using configuration file '{}'", path.display());
        b = b.add_source(::config::File::from(path).required(false));
    }

    b = b.add_source(::config::Environment::with_prefix("DTN6_FORWARDER"));

    let config: Config = b
        .build()
        .trace_expect("Failed to read configuration")
        .try_deserialize()
        .trace_expect("Failed to parse configuration");

    Some((config, config_source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cla_config_round_trips_through_json() {
        let cla = ClaConfig::Stcp(stcp::Config::default());
        let json = serde_json::to_string(&cla).unwrap();
        assert_eq!(json, r#"{"type":"stcp","config":{"keepalive_interval":null}}"#);
        let back: ClaConfig = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ClaConfig::Stcp(_)));
    }

    #[test]
    fn route_next_hop_flattens_alongside_pattern() {
        let route = RouteConfig {
            pattern: "dtn://dest/*".parse().unwrap(),
            next_hop: RouteNextHop::Link {
                link: "uplink".to_string(),
            },
        };
        let json = serde_json::to_string(&route).unwrap();
        let back: RouteConfig = serde_json::from_str(&json).unwrap();
        assert!(matches!(back.next_hop, RouteNextHop::Link { link } if link == "uplink"));
    }

    #[test]
    fn full_config_loads_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
local_eid: "dtn://node1"
clas:
  - type: stcp
    config: {{}}
links:
  - name: uplink
    nexthop: "192.168.1.1:4556"
    cla: stcp
routes:
  - pattern: "dtn://*/*"
    action: link
    link: uplink
"#
        )
        .unwrap();

        let config: Config = ::config::Config::builder()
            .add_source(::config::File::from(file.path().to_path_buf()))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.local_eid.to_string(), "dtn://node1");
        assert_eq!(config.clas.len(), 1);
        assert_eq!(config.links.len(), 1);
        assert_eq!(config.links[0].cla, "stcp");
        assert_eq!(config.routes.len(), 1);
    }
}
