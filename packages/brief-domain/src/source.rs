use url::Url;

const MULTI_PART_SUFFIXES: [&str; 12] = [
	"ac.uk", "co.in", "co.jp", "co.nz", "co.uk", "com.au", "com.br", "com.cn", "com.hk", "com.sg",
	"gov.uk", "org.uk",
];

/// Host of an item link and its registrable base domain.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SourceDomain {
	pub host: String,
	pub base: String,
}
impl SourceDomain {
	pub fn parse(link: &str) -> Option<Self> {
		let url = Url::parse(link.trim()).ok()?;
		let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();

		if host.is_empty() {
			return None;
		}

		let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
		let base = base_domain(&host);

		Some(Self { host, base })
	}

	/// True when the host or its base domain falls under an allow-listed domain.
	pub fn is_listed(&self, domains: &[String]) -> bool {
		domains.iter().any(|domain| {
			let domain = domain.as_str();

			self.base == domain || self.host == domain || self.host.ends_with(&format!(".{domain}"))
		})
	}
}

fn base_domain(host: &str) -> String {
	if host.parse::<std::net::IpAddr>().is_ok() {
		return host.to_string();
	}

	let labels: Vec<&str> = host.split('.').filter(|label| !label.is_empty()).collect();

	if labels.len() <= 2 {
		return labels.join(".");
	}

	let tail = labels[labels.len() - 2..].join(".");
	let keep = if MULTI_PART_SUFFIXES.contains(&tail.as_str()) { 3 } else { 2 };

	labels[labels.len().saturating_sub(keep)..].join(".")
}
