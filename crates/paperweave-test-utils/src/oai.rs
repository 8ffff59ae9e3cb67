//! OAI-PMH response documents in the shape arXiv serves them.

/// One `<record>` in a ListRecords page.
#[derive(Debug, Clone, Default)]
pub struct OaiRecordFixture {
    pub identifier: String,
    pub datestamp: String,
    pub sets: Vec<String>,
    pub title: String,
    pub creators: Vec<String>,
    pub description: Option<String>,
    pub identifiers: Vec<String>,
    pub rights: Option<String>,
    pub deleted: bool,
}

impl OaiRecordFixture {
    /// A live arXiv record with one author and one set.
    pub fn arxiv(id: &str, datestamp: &str, title: &str) -> Self {
        Self {
            identifier: format!("oai:arXiv.org:{id}"),
            datestamp: datestamp.to_string(),
            sets: vec!["cs".to_string()],
            title: title.to_string(),
            creators: vec!["Lovelace, Ada".to_string()],
            description: Some(format!("Abstract of {id}.")),
            identifiers: vec![format!("http://arxiv.org/abs/{id}")],
            rights: None,
            deleted: false,
        }
    }

    pub fn deleted(id: &str, datestamp: &str) -> Self {
        Self {
            identifier: format!("oai:arXiv.org:{id}"),
            datestamp: datestamp.to_string(),
            deleted: true,
            ..Default::default()
        }
    }

    pub fn with_creators(mut self, creators: &[&str]) -> Self {
        self.creators = creators.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_sets(mut self, sets: &[&str]) -> Self {
        self.sets = sets.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_identifier(mut self, identifier: &str) -> Self {
        self.identifiers.push(identifier.to_string());
        self
    }

    fn to_xml(&self) -> String {
        let mut out = String::from("<record>");
        if self.deleted {
            out.push_str(r#"<header status="deleted">"#);
        } else {
            out.push_str("<header>");
        }
        out.push_str(&format!("<identifier>{}</identifier>", escape(&self.identifier)));
        out.push_str(&format!("<datestamp>{}</datestamp>", escape(&self.datestamp)));
        for set in &self.sets {
            out.push_str(&format!("<setSpec>{}</setSpec>", escape(set)));
        }
        out.push_str("</header>");

        if !self.deleted {
            out.push_str(
                r#"<metadata><oai_dc:dc xmlns:oai_dc="http://www.openarchives.org/OAI/2.0/oai_dc/" xmlns:dc="http://purl.org/dc/elements/1.1/">"#,
            );
            out.push_str(&format!("<dc:title>{}</dc:title>", escape(&self.title)));
            for creator in &self.creators {
                out.push_str(&format!("<dc:creator>{}</dc:creator>", escape(creator)));
            }
            if let Some(description) = &self.description {
                out.push_str(&format!("<dc:description>{}</dc:description>", escape(description)));
            }
            for identifier in &self.identifiers {
                out.push_str(&format!("<dc:identifier>{}</dc:identifier>", escape(identifier)));
            }
            if let Some(rights) = &self.rights {
                out.push_str(&format!("<dc:rights>{}</dc:rights>", escape(rights)));
            }
            out.push_str("</oai_dc:dc></metadata>");
        }
        out.push_str("</record>");
        out
    }
}

fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
<responseDate>2025-01-01T00:00:00Z</responseDate>
<request verb="ListRecords">https://oaipmh.arxiv.org/oai</request>
{body}
</OAI-PMH>"#
    )
}

/// A ListRecords page. `Some("")` renders the empty token that marks the last page.
pub fn oai_page(records: &[OaiRecordFixture], resumption_token: Option<&str>) -> String {
    let mut body = String::from("<ListRecords>");
    for record in records {
        body.push_str(&record.to_xml());
    }
    match resumption_token {
        Some("") => body.push_str(r#"<resumptionToken cursor="0" completeListSize="0"/>"#),
        Some(token) => body.push_str(&format!(
            r#"<resumptionToken cursor="0" completeListSize="1000">{}</resumptionToken>"#,
            escape(token)
        )),
        None => {}
    }
    body.push_str("</ListRecords>");
    envelope(&body)
}

pub fn oai_error(code: &str, message: &str) -> String {
    envelope(&format!(r#"<error code="{}">{}</error>"#, escape(code), escape(message)))
}

pub fn identify_response() -> String {
    envelope(
        "<Identify><repositoryName>arXiv</repositoryName>\
         <baseURL>https://oaipmh.arxiv.org/oai</baseURL>\
         <protocolVersion>2.0</protocolVersion>\
         <earliestDatestamp>2005-09-16</earliestDatestamp>\
         <granularity>YYYY-MM-DD</granularity></Identify>",
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}
