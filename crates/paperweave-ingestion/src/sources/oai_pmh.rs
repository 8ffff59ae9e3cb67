//! OAI-PMH over HTTP, plus the response parsers.
//!
//! Verbs used:
//!   ListRecords: `metadataPrefix`, `from`, `until`, `set`, or `resumptionToken`
//!   Identify:    connectivity check
//!
//! Only `oai_dc` (Dublin Core) metadata is understood.

use async_trait::async_trait;
use paperweave_common::http::PoliteClient;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::OaiEndpoint;
use crate::error::HarvestError;
use crate::models::{OaiPage, RawRecord, RepositoryInfo};

pub const ARXIV_OAI_URL: &str = "https://oaipmh.arxiv.org/oai";

/// The OAI-PMH error code meaning "the query matched nothing".
const NO_RECORDS_MATCH: &str = "noRecordsMatch";

pub struct HttpOaiEndpoint {
    client: PoliteClient,
    base_url: String,
}

impl HttpOaiEndpoint {
    pub fn new(client: PoliteClient, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl OaiEndpoint for HttpOaiEndpoint {
    #[instrument(skip(self), fields(url = %self.base_url))]
    async fn fetch(&self, params: &[(&'static str, String)]) -> Result<String, HarvestError> {
        let resp = self.client.get(&self.base_url)?.query(params).send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(HarvestError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(HarvestError::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(HarvestError::Fatal(format!("HTTP {status}")));
        }

        let body = resp.text().await?;
        debug!(bytes = body.len(), "OAI-PMH response received");
        Ok(body)
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    HeaderIdentifier,
    Datestamp,
    SetSpec,
    Title,
    Creator,
    Description,
    DcIdentifier,
    Rights,
    ResumptionToken,
    Error,
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn malformed(e: impl std::fmt::Display) -> HarvestError {
    // A body that cannot be tokenised is almost always a truncated transfer.
    HarvestError::Transient(format!("malformed OAI-PMH XML: {e}"))
}

/// Parse a ListRecords response.
///
/// `noRecordsMatch` yields an empty final page; any other OAI error is a
/// protocol error. Records missing `identifier` or `datestamp` are dropped
/// with a warning and counted in [`OaiPage::dropped`].
pub fn parse_list_records(xml: &str) -> Result<OaiPage, HarvestError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = OaiPage::default();
    let mut current: Option<RawRecord> = None;
    let mut in_header = false;
    let mut field: Option<Field> = None;
    let mut text = String::new();
    let mut error_code: Option<String> = None;
    let mut error_message = String::new();
    let mut list_closed = false;
    let mut root_closed = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                text.clear();
                match e.local_name().as_ref() {
                    b"record" => current = Some(RawRecord::default()),
                    b"header" => {
                        in_header = true;
                        if let Some(ref mut r) = current {
                            r.deleted = attribute(e, b"status").as_deref() == Some("deleted");
                        }
                    }
                    b"identifier" if in_header => field = Some(Field::HeaderIdentifier),
                    b"identifier" if current.is_some() => field = Some(Field::DcIdentifier),
                    b"datestamp" if in_header => field = Some(Field::Datestamp),
                    b"setSpec" if in_header => field = Some(Field::SetSpec),
                    b"title" if current.is_some() => field = Some(Field::Title),
                    b"creator" if current.is_some() => field = Some(Field::Creator),
                    b"description" if current.is_some() => field = Some(Field::Description),
                    b"rights" if current.is_some() => field = Some(Field::Rights),
                    b"resumptionToken" => {
                        page.complete_list_size =
                            attribute(e, b"completeListSize").and_then(|s| s.parse().ok());
                        field = Some(Field::ResumptionToken);
                    }
                    b"error" if current.is_none() => {
                        error_code = Some(attribute(e, b"code").unwrap_or_default());
                        field = Some(Field::Error);
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"resumptionToken" => {
                    page.complete_list_size = attribute(e, b"completeListSize").and_then(|s| s.parse().ok());
                }
                b"error" if current.is_none() => error_code = Some(attribute(e, b"code").unwrap_or_default()),
                b"header" => {
                    in_header = false;
                    if let Some(ref mut r) = current {
                        r.deleted = attribute(e, b"status").as_deref() == Some("deleted");
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if field.is_some() {
                    text.push_str(&e.unescape().map_err(malformed)?);
                }
            }
            Ok(Event::CData(ref e)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                match (field, name.as_ref()) {
                    (Some(f), _) if closes(f, name.as_ref()) => {
                        let value = std::mem::take(&mut text).trim().to_string();
                        field = None;
                        match f {
                            Field::ResumptionToken => {
                                page.resumption_token = Some(value).filter(|t| !t.is_empty());
                            }
                            Field::Error => error_message = value,
                            _ => {
                                if let Some(ref mut r) = current {
                                    assign(r, f, value);
                                }
                            }
                        }
                    }
                    (_, b"header") => in_header = false,
                    (_, b"ListRecords") => list_closed = true,
                    (_, b"OAI-PMH") => root_closed = true,
                    (_, b"record") => {
                        if let Some(r) = current.take() {
                            if r.identifier.is_empty() || r.datestamp.is_empty() {
                                warn!(identifier = %r.identifier, "Dropping OAI record without identifier or datestamp");
                                page.dropped += 1;
                            } else {
                                page.records.push(r);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e)),
            _ => {}
        }
    }

    // A body cut off between elements still tokenises cleanly, and would
    // otherwise read as a final page without its resumption token.
    if !root_closed {
        return Err(malformed("document ends before </OAI-PMH>"));
    }
    if let Some(code) = error_code {
        if code == NO_RECORDS_MATCH {
            debug!("OAI-PMH reported noRecordsMatch");
            return Ok(OaiPage::default());
        }
        return Err(HarvestError::Protocol { code, message: error_message });
    }
    if !list_closed {
        return Err(malformed("no complete <ListRecords> element"));
    }
    Ok(page)
}

fn closes(field: Field, name: &[u8]) -> bool {
    let expected: &[u8] = match field {
        Field::HeaderIdentifier | Field::DcIdentifier => b"identifier",
        Field::Datestamp => b"datestamp",
        Field::SetSpec => b"setSpec",
        Field::Title => b"title",
        Field::Creator => b"creator",
        Field::Description => b"description",
        Field::Rights => b"rights",
        Field::ResumptionToken => b"resumptionToken",
        Field::Error => b"error",
    };
    expected == name
}

fn assign(record: &mut RawRecord, field: Field, value: String) {
    match field {
        Field::HeaderIdentifier => record.identifier = value,
        Field::Datestamp => record.datestamp = value,
        Field::SetSpec => record.set_specs.push(value),
        Field::Title => record.title = Some(value),
        Field::Creator => record.creators.push(value),
        Field::Description => record.descriptions.push(value),
        Field::DcIdentifier => record.identifiers.push(value),
        Field::Rights => record.rights = Some(value),
        Field::ResumptionToken | Field::Error => {}
    }
}

/// Parse an Identify response.
pub fn parse_identify(xml: &str) -> Result<RepositoryInfo, HarvestError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut info = RepositoryInfo::default();
    let mut current: Vec<u8> = Vec::new();
    let mut error_code: Option<String> = None;
    let mut seen_identify = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                current = e.local_name().as_ref().to_vec();
                match current.as_slice() {
                    b"Identify" => seen_identify = true,
                    b"error" => error_code = Some(attribute(e, b"code").unwrap_or_default()),
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                let value = e.unescape().map_err(malformed)?.trim().to_string();
                match current.as_slice() {
                    b"repositoryName" => info.repository_name = value,
                    b"baseURL" => info.base_url = value,
                    b"protocolVersion" => info.protocol_version = value,
                    b"earliestDatestamp" => info.earliest_datestamp = value,
                    b"granularity" => info.granularity = value,
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current.clear(),
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e)),
            _ => {}
        }
    }

    if let Some(code) = error_code {
        return Err(HarvestError::Protocol { code, message: "Identify failed".to_string() });
    }
    if !seen_identify {
        return Err(HarvestError::Fatal("response carries no Identify element".to_string()));
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperweave_test_utils::{identify_response, oai_error, oai_page, OaiRecordFixture};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_minimal_list_records() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <ListRecords>
    <record>
      <header>
        <identifier>oai:arXiv.org:0704.0001</identifier>
        <datestamp>2008-11-13</datestamp>
        <setSpec>physics:hep-ph</setSpec>
      </header>
      <metadata>
        <oai_dc:dc xmlns:oai_dc="http://www.openarchives.org/OAI/2.0/oai_dc/" xmlns:dc="http://purl.org/dc/elements/1.1/">
          <dc:title>Calculation of prompt diphoton production
 cross sections at Tevatron and LHC energies</dc:title>
          <dc:creator>Bal&#225;zs, C.</dc:creator>
          <dc:creator>Berger, E. L.</dc:creator>
          <dc:description>A fully differential calculation &amp; more.</dc:description>
          <dc:identifier>http://arxiv.org/abs/0704.0001</dc:identifier>
          <dc:identifier>Phys.Rev.D76:013009,2007</dc:identifier>
          <dc:identifier>doi:10.1103/PhysRevD.76.013009</dc:identifier>
        </oai_dc:dc>
      </metadata>
    </record>
    <resumptionToken cursor="0" completeListSize="2">token-1</resumptionToken>
  </ListRecords>
</OAI-PMH>"#;

        let page = parse_list_records(xml).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.resumption_token.as_deref(), Some("token-1"));
        assert_eq!(page.complete_list_size, Some(2));

        let r = &page.records[0];
        assert_eq!(r.identifier, "oai:arXiv.org:0704.0001");
        assert_eq!(r.datestamp, "2008-11-13");
        assert_eq!(r.set_specs, vec!["physics:hep-ph"]);
        assert!(r.title.as_deref().unwrap().starts_with("Calculation of prompt diphoton"));
        assert_eq!(r.creators, vec!["Balázs, C.", "Berger, E. L."]);
        assert_eq!(r.descriptions, vec!["A fully differential calculation & more."]);
        assert_eq!(r.identifiers.len(), 3);
        assert!(!r.deleted);
    }

    #[test]
    fn test_empty_resumption_token_marks_last_page() {
        let xml = oai_page(&[OaiRecordFixture::arxiv("2501.00001", "2025-01-02", "A")], Some(""));
        let page = parse_list_records(&xml).unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.is_last());
    }

    #[test]
    fn test_deleted_header_and_dropped_records() {
        let mut broken = OaiRecordFixture::arxiv("2501.00003", "", "No datestamp");
        broken.datestamp.clear();
        let xml = oai_page(
            &[OaiRecordFixture::deleted("2501.00002", "2025-01-03"), broken],
            None,
        );
        let page = parse_list_records(&xml).unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.records[0].deleted);
        assert_eq!(page.dropped, 1);
    }

    #[test]
    fn test_no_records_match_is_an_empty_final_page() {
        let page = parse_list_records(&oai_error("noRecordsMatch", "nothing")).unwrap();
        assert!(page.records.is_empty());
        assert!(page.is_last());
    }

    #[test]
    fn test_other_oai_errors_are_protocol_errors() {
        let err = parse_list_records(&oai_error("badResumptionToken", "expired")).unwrap_err();
        match err {
            HarvestError::Protocol { code, message } => {
                assert_eq!(code, "badResumptionToken");
                assert_eq!(message, "expired");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_truncated_body_is_transient() {
        let xml = oai_page(&[OaiRecordFixture::arxiv("2501.00001", "2025-01-02", "A")], None);
        let truncated = &xml[..xml.len() / 2];
        assert!(matches!(parse_list_records(truncated), Err(e) if e.is_transient()));
    }

    #[test]
    fn test_body_cut_between_records_is_transient() {
        let xml = oai_page(
            &[
                OaiRecordFixture::arxiv("2501.00001", "2025-01-02", "A"),
                OaiRecordFixture::arxiv("2501.00002", "2025-01-02", "B"),
            ],
            Some("token-1"),
        );
        let cut = xml.find("</record>").unwrap() + "</record>".len();
        assert!(matches!(parse_list_records(&xml[..cut]), Err(e) if e.is_transient()));

        // Envelope closed but the ListRecords body is missing.
        let hollow = r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/"><responseDate>x</responseDate></OAI-PMH>"#;
        assert!(matches!(parse_list_records(hollow), Err(e) if e.is_transient()));
    }

    #[test]
    fn test_parse_identify() {
        let info = parse_identify(&identify_response()).unwrap();
        assert_eq!(info.repository_name, "arXiv");
        assert_eq!(info.granularity, "YYYY-MM-DD");
        assert!(parse_identify(&oai_error("badVerb", "x")).is_err());
    }
}
