use crate::request::ForwardRequest;
use fanout_dns_domain::DomainError;
use hickory_proto::rr::Name;

/// Parses a zone name from configuration. Names are made fully qualified.
pub fn parse_zone(zone: &str) -> Result<Name, DomainError> {
    let mut name = Name::from_ascii(zone).map_err(|e| {
        DomainError::InvalidDomainName(format!("Invalid zone '{}': {}", zone, e))
    })?;
    name.set_fqdn(true);
    Ok(name)
}

/// Decides whether a query belongs to this forwarder.
///
/// A name is admitted when it sits at or below `from` and under none of the
/// excluded zones; the `from` apex itself is always admitted.
#[derive(Debug, Clone)]
pub struct Admission {
    from: Name,
    ignored: Vec<Name>,
}

impl Default for Admission {
    fn default() -> Self {
        Self::new(Name::root(), Vec::new())
    }
}

impl Admission {
    pub fn new(from: Name, ignored: Vec<Name>) -> Self {
        Self { from, ignored }
    }

    pub fn from_config(from: &str, except: &[String]) -> Result<Self, DomainError> {
        let ignored = except
            .iter()
            .map(|zone| parse_zone(zone))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(parse_zone(from)?, ignored))
    }

    pub fn zone(&self) -> &Name {
        &self.from
    }

    pub fn ignored(&self) -> &[Name] {
        &self.ignored
    }

    pub fn admit(&self, request: &ForwardRequest) -> bool {
        request.qname().is_some_and(|name| self.admit_name(name))
    }

    pub fn admit_name(&self, name: &Name) -> bool {
        self.from.zone_of(name) && self.is_allowed_domain(name)
    }

    fn is_allowed_domain(&self, name: &Name) -> bool {
        if crate::request::same_name(name, &self.from) {
            return true;
        }
        !self.ignored.iter().any(|ignore| ignore.zone_of(name))
    }
}
