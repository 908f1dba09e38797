//! Static routing table from indicator kind to candidate services.

use crate::classify::IndicatorKind;

use super::types::ServiceKey;

/// Services relevant to an indicator kind, in dispatch order.
///
/// Pure lookup over a fixed table. `Unknown` maps to an empty slice, which
/// the aggregator treats as "nothing to query" rather than an error.
pub fn services_for(kind: IndicatorKind) -> &'static [ServiceKey] {
    use ServiceKey::*;
    match kind {
        IndicatorKind::Ip => &[Shodan, GreyNoise, AbuseIpdb, Otx, ThreatFox],
        IndicatorKind::Domain => &[CrtSh, SecurityTrails, Otx, UrlScan],
        IndicatorKind::Hash => &[VirusTotal, Otx, ThreatFox, UrlHaus],
        IndicatorKind::Url => &[VirusTotal, UrlScan, UrlHaus, ThreatFox],
        IndicatorKind::Email => &[Hibp, EmailRep],
        IndicatorKind::Username => &[GitHub],
        IndicatorKind::Unknown => &[],
    }
}
