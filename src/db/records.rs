//! Static schema and row type for the catalog table.
//!
//! The column list is declared here once and drives everything that needs
//! it: DDL bootstrap, insert/update column sets and the `describe()`
//! property schema. Columns are never discovered from the live database.

use serde_json::{Map, Value, json};

/// Storage type of a catalog column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Float,
}

/// One column of the catalog table.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub indexed: bool,
    pub default: Option<&'static str>,
}

const fn text(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        ty: ColumnType::Text,
        nullable: true,
        indexed: true,
        default: None,
    }
}

const fn float(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        ty: ColumnType::Float,
        nullable: true,
        indexed: true,
        default: None,
    }
}

const fn core(name: &'static str, default: Option<&'static str>, indexed: bool) -> ColumnDef {
    ColumnDef {
        name,
        ty: ColumnType::Text,
        nullable: false,
        indexed,
        default,
    }
}

/// Every column of the catalog table, in storage order.
pub const COLUMNS: &[ColumnDef] = &[
    // core; nothing happens without these
    core("identifier", None, false),
    core("typename", Some("csw:Record"), true),
    core("schema", Some("http://www.opengis.net/cat/csw/2.0.2"), true),
    core("mdsource", Some("local"), true),
    core("insert_date", None, true),
    ColumnDef {
        name: "xml",
        ty: ColumnType::Text,
        nullable: false,
        indexed: false,
        default: None,
    },
    ColumnDef {
        name: "anytext",
        ty: ColumnType::Text,
        nullable: false,
        indexed: false,
        default: None,
    },
    ColumnDef {
        name: "metadata",
        ty: ColumnType::Text,
        nullable: true,
        indexed: false,
        default: None,
    },
    core("metadata_type", Some("application/xml"), false),
    text("language"),
    // identification
    text("type"),
    text("title"),
    text("title_alternate"),
    text("abstract"),
    text("edition"),
    text("keywords"),
    text("keywordstype"),
    text("themes"),
    text("parentidentifier"),
    text("relation"),
    text("time_begin"),
    text("time_end"),
    text("topicategory"),
    text("resourcelanguage"),
    // attribution
    text("creator"),
    text("publisher"),
    text("contributor"),
    text("organization"),
    // security
    text("securityconstraints"),
    text("accessconstraints"),
    text("otherconstraints"),
    // dates
    text("date"),
    text("date_revision"),
    text("date_creation"),
    text("date_publication"),
    text("date_modified"),
    text("format"),
    text("source"),
    // geospatial
    text("crs"),
    text("geodescode"),
    text("denominator"),
    text("distancevalue"),
    text("distanceuom"),
    ColumnDef {
        name: "wkt_geometry",
        ty: ColumnType::Text,
        nullable: true,
        indexed: false,
        default: None,
    },
    float("vert_extent_min"),
    float("vert_extent_max"),
    // service
    text("servicetype"),
    text("servicetypeversion"),
    text("operation"),
    text("couplingtype"),
    text("operateson"),
    text("operatesonidentifier"),
    text("operatesoname"),
    // inspire
    text("degree"),
    text("classification"),
    text("conditionapplyingtoaccessanduse"),
    text("lineage"),
    text("responsiblepartyrole"),
    text("specificationtitle"),
    text("specificationdate"),
    text("specificationdatetype"),
    // eo
    text("platform"),
    text("instrument"),
    text("sensortype"),
    text("cloudcover"),
    // bands: JSON list of dicts with properties: name, units, min, max
    text("bands"),
    text("illuminationelevationangle"),
    // distribution
    // links/contacts: JSON lists of link and contact dicts
    text("links"),
    text("contacts"),
];

/// Columns that never appear in the described property schema.
pub const INTERNAL_COLUMNS: &[&str] = &["anytext", "metadata", "metadata_type", "xml"];

/// One catalog record.
///
/// Field order mirrors [`COLUMNS`]; the non-nullable core set is `String`,
/// everything else is optional.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Record {
    pub identifier: String,
    pub typename: String,
    pub schema: String,
    pub mdsource: String,
    pub insert_date: String,
    pub xml: String,
    pub anytext: String,
    pub metadata: Option<String>,
    pub metadata_type: String,
    pub language: Option<String>,
    #[sqlx(rename = "type")]
    pub type_: Option<String>,
    pub title: Option<String>,
    pub title_alternate: Option<String>,
    #[sqlx(rename = "abstract")]
    pub abstract_: Option<String>,
    pub edition: Option<String>,
    pub keywords: Option<String>,
    pub keywordstype: Option<String>,
    pub themes: Option<String>,
    pub parentidentifier: Option<String>,
    pub relation: Option<String>,
    pub time_begin: Option<String>,
    pub time_end: Option<String>,
    pub topicategory: Option<String>,
    pub resourcelanguage: Option<String>,
    pub creator: Option<String>,
    pub publisher: Option<String>,
    pub contributor: Option<String>,
    pub organization: Option<String>,
    pub securityconstraints: Option<String>,
    pub accessconstraints: Option<String>,
    pub otherconstraints: Option<String>,
    pub date: Option<String>,
    pub date_revision: Option<String>,
    pub date_creation: Option<String>,
    pub date_publication: Option<String>,
    pub date_modified: Option<String>,
    pub format: Option<String>,
    pub source: Option<String>,
    pub crs: Option<String>,
    pub geodescode: Option<String>,
    pub denominator: Option<String>,
    pub distancevalue: Option<String>,
    pub distanceuom: Option<String>,
    pub wkt_geometry: Option<String>,
    pub vert_extent_min: Option<f64>,
    pub vert_extent_max: Option<f64>,
    pub servicetype: Option<String>,
    pub servicetypeversion: Option<String>,
    pub operation: Option<String>,
    pub couplingtype: Option<String>,
    pub operateson: Option<String>,
    pub operatesonidentifier: Option<String>,
    pub operatesoname: Option<String>,
    pub degree: Option<String>,
    pub classification: Option<String>,
    pub conditionapplyingtoaccessanduse: Option<String>,
    pub lineage: Option<String>,
    pub responsiblepartyrole: Option<String>,
    pub specificationtitle: Option<String>,
    pub specificationdate: Option<String>,
    pub specificationdatetype: Option<String>,
    pub platform: Option<String>,
    pub instrument: Option<String>,
    pub sensortype: Option<String>,
    pub cloudcover: Option<String>,
    pub bands: Option<String>,
    pub illuminationelevationangle: Option<String>,
    pub links: Option<String>,
    pub contacts: Option<String>,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            typename: "csw:Record".to_string(),
            schema: "http://www.opengis.net/cat/csw/2.0.2".to_string(),
            mdsource: "local".to_string(),
            insert_date: String::new(),
            xml: String::new(),
            anytext: String::new(),
            metadata: None,
            metadata_type: "application/xml".to_string(),
            language: None,
            type_: None,
            title: None,
            title_alternate: None,
            abstract_: None,
            edition: None,
            keywords: None,
            keywordstype: None,
            themes: None,
            parentidentifier: None,
            relation: None,
            time_begin: None,
            time_end: None,
            topicategory: None,
            resourcelanguage: None,
            creator: None,
            publisher: None,
            contributor: None,
            organization: None,
            securityconstraints: None,
            accessconstraints: None,
            otherconstraints: None,
            date: None,
            date_revision: None,
            date_creation: None,
            date_publication: None,
            date_modified: None,
            format: None,
            source: None,
            crs: None,
            geodescode: None,
            denominator: None,
            distancevalue: None,
            distanceuom: None,
            wkt_geometry: None,
            vert_extent_min: None,
            vert_extent_max: None,
            servicetype: None,
            servicetypeversion: None,
            operation: None,
            couplingtype: None,
            operateson: None,
            operatesonidentifier: None,
            operatesoname: None,
            degree: None,
            classification: None,
            conditionapplyingtoaccessanduse: None,
            lineage: None,
            responsiblepartyrole: None,
            specificationtitle: None,
            specificationdate: None,
            specificationdatetype: None,
            platform: None,
            instrument: None,
            sensortype: None,
            cloudcover: None,
            bands: None,
            illuminationelevationangle: None,
            links: None,
            contacts: None,
        }
    }
}

/// A column's value, typed for binding.
pub(crate) enum ColumnValue<'a> {
    Text(Option<&'a str>),
    Float(Option<f64>),
}

impl Record {
    /// Set the XML document from a raw byte payload, decoding it to text
    /// the way every mutation entry point expects it stored.
    pub fn set_xml_payload(&mut self, raw: &[u8]) -> Result<(), crate::error::RepositoryError> {
        self.xml = crate::xml::decode_document(raw)?;
        Ok(())
    }

    /// Value of a column by its storage name.
    pub(crate) fn column_value(&self, name: &str) -> ColumnValue<'_> {
        use ColumnValue::{Float, Text};
        match name {
            "identifier" => Text(Some(&self.identifier)),
            "typename" => Text(Some(&self.typename)),
            "schema" => Text(Some(&self.schema)),
            "mdsource" => Text(Some(&self.mdsource)),
            "insert_date" => Text(Some(&self.insert_date)),
            "xml" => Text(Some(&self.xml)),
            "anytext" => Text(Some(&self.anytext)),
            "metadata" => Text(self.metadata.as_deref()),
            "metadata_type" => Text(Some(&self.metadata_type)),
            "language" => Text(self.language.as_deref()),
            "type" => Text(self.type_.as_deref()),
            "title" => Text(self.title.as_deref()),
            "title_alternate" => Text(self.title_alternate.as_deref()),
            "abstract" => Text(self.abstract_.as_deref()),
            "edition" => Text(self.edition.as_deref()),
            "keywords" => Text(self.keywords.as_deref()),
            "keywordstype" => Text(self.keywordstype.as_deref()),
            "themes" => Text(self.themes.as_deref()),
            "parentidentifier" => Text(self.parentidentifier.as_deref()),
            "relation" => Text(self.relation.as_deref()),
            "time_begin" => Text(self.time_begin.as_deref()),
            "time_end" => Text(self.time_end.as_deref()),
            "topicategory" => Text(self.topicategory.as_deref()),
            "resourcelanguage" => Text(self.resourcelanguage.as_deref()),
            "creator" => Text(self.creator.as_deref()),
            "publisher" => Text(self.publisher.as_deref()),
            "contributor" => Text(self.contributor.as_deref()),
            "organization" => Text(self.organization.as_deref()),
            "securityconstraints" => Text(self.securityconstraints.as_deref()),
            "accessconstraints" => Text(self.accessconstraints.as_deref()),
            "otherconstraints" => Text(self.otherconstraints.as_deref()),
            "date" => Text(self.date.as_deref()),
            "date_revision" => Text(self.date_revision.as_deref()),
            "date_creation" => Text(self.date_creation.as_deref()),
            "date_publication" => Text(self.date_publication.as_deref()),
            "date_modified" => Text(self.date_modified.as_deref()),
            "format" => Text(self.format.as_deref()),
            "source" => Text(self.source.as_deref()),
            "crs" => Text(self.crs.as_deref()),
            "geodescode" => Text(self.geodescode.as_deref()),
            "denominator" => Text(self.denominator.as_deref()),
            "distancevalue" => Text(self.distancevalue.as_deref()),
            "distanceuom" => Text(self.distanceuom.as_deref()),
            "wkt_geometry" => Text(self.wkt_geometry.as_deref()),
            "vert_extent_min" => Float(self.vert_extent_min),
            "vert_extent_max" => Float(self.vert_extent_max),
            "servicetype" => Text(self.servicetype.as_deref()),
            "servicetypeversion" => Text(self.servicetypeversion.as_deref()),
            "operation" => Text(self.operation.as_deref()),
            "couplingtype" => Text(self.couplingtype.as_deref()),
            "operateson" => Text(self.operateson.as_deref()),
            "operatesonidentifier" => Text(self.operatesonidentifier.as_deref()),
            "operatesoname" => Text(self.operatesoname.as_deref()),
            "degree" => Text(self.degree.as_deref()),
            "classification" => Text(self.classification.as_deref()),
            "conditionapplyingtoaccessanduse" => Text(self.conditionapplyingtoaccessanduse.as_deref()),
            "lineage" => Text(self.lineage.as_deref()),
            "responsiblepartyrole" => Text(self.responsiblepartyrole.as_deref()),
            "specificationtitle" => Text(self.specificationtitle.as_deref()),
            "specificationdate" => Text(self.specificationdate.as_deref()),
            "specificationdatetype" => Text(self.specificationdatetype.as_deref()),
            "platform" => Text(self.platform.as_deref()),
            "instrument" => Text(self.instrument.as_deref()),
            "sensortype" => Text(self.sensortype.as_deref()),
            "cloudcover" => Text(self.cloudcover.as_deref()),
            "bands" => Text(self.bands.as_deref()),
            "illuminationelevationangle" => Text(self.illuminationelevationangle.as_deref()),
            "links" => Text(self.links.as_deref()),
            "contacts" => Text(self.contacts.as_deref()),
            _ => Text(None),
        }
    }
}

/// Property schema of the catalog: every storage column except the internal
/// ones, with a type classification and the identifier marked as the id.
pub fn describe() -> Map<String, Value> {
    let mut properties = Map::new();

    properties.insert(
        "geometry".to_string(),
        json!({
            "$ref": "https://geojson.org/schema/Polygon.json",
            "x-ogc-role": "primary-geometry"
        }),
    );

    for column in COLUMNS {
        if INTERNAL_COLUMNS.contains(&column.name) {
            continue;
        }
        let mut property = json!({
            "title": column.name,
            "type": match column.ty {
                ColumnType::Text => "string",
                ColumnType::Float => "number",
            },
        });
        if column.name == "identifier" {
            property["x-ogc-role"] = json!("id");
        }
        properties.insert(column.name.to_string(), property);
    }

    properties
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_match_struct_width() {
        // one enum arm per declared column
        let record = Record::default();
        for column in COLUMNS {
            match record.column_value(column.name) {
                ColumnValue::Text(_) => assert_eq!(column.ty, ColumnType::Text, "{}", column.name),
                ColumnValue::Float(_) => assert_eq!(column.ty, ColumnType::Float, "{}", column.name),
            }
        }
    }

    #[test]
    fn test_describe_hides_internal_columns() {
        let properties = describe();
        for internal in INTERNAL_COLUMNS {
            assert!(!properties.contains_key(*internal), "{internal} leaked");
        }
        assert!(properties.contains_key("title"));
        assert!(properties.contains_key("wkt_geometry"));
    }

    #[test]
    fn test_describe_marks_identifier_and_geometry() {
        let properties = describe();
        assert_eq!(properties["identifier"]["x-ogc-role"], "id");
        assert_eq!(properties["geometry"]["x-ogc-role"], "primary-geometry");
        assert_eq!(properties["vert_extent_min"]["type"], "number");
        assert_eq!(properties["title"]["type"], "string");
    }

    #[test]
    fn test_set_xml_payload_decodes_bytes() {
        let mut record = Record::default();
        record.set_xml_payload(b"\xef\xbb\xbf<doc/>").unwrap();
        assert_eq!(record.xml, "<doc/>");
        assert!(record.set_xml_payload(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_default_record_carries_column_defaults() {
        let record = Record::default();
        assert_eq!(record.typename, "csw:Record");
        assert_eq!(record.mdsource, "local");
        assert_eq!(record.metadata_type, "application/xml");
    }
}
