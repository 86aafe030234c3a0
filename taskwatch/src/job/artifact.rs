//! Download references for files produced by tool services.
//!
//! Tool services report where they wrote their output as a server-side path inside the task
//! result, e.g. `{"pdf_path": "C:\\out\\x\\report.pdf"}`. Only the final path segment is
//! meaningful to the client: each service serves its output directory by file name.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of artifact a task produced, keyed by the result field it was found in.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Compiled slide deck or document (`pdf_path`).
    Document,
    /// Rendered chart image (`image_path`).
    Chart,
    /// Generated API documentation (`doc_path`).
    ApiDoc,
    /// Any other file (`artifact_path`, `file_path`, `output_path`).
    File,
}

impl ArtifactKind {
    /// Result fields recognized as artifact paths, in lookup order.
    pub const FIELDS: [(&'static str, ArtifactKind); 6] = [
        ("artifact_path", ArtifactKind::File),
        ("pdf_path", ArtifactKind::Document),
        ("image_path", ArtifactKind::Chart),
        ("doc_path", ArtifactKind::ApiDoc),
        ("file_path", ArtifactKind::File),
        ("output_path", ArtifactKind::File),
    ];
}

/// Where each kind of artifact can be downloaded from.
///
/// The defaults match a local deployment of the tool services. Document, chart and API doc
/// services expose `GET {base}/download/{filename}`; generic files are served as static files
/// at `{base}/{filename}`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactEndpoints {
    pub document: String,
    pub chart: String,
    pub api_doc: String,
    pub file: String,
}

impl Default for ArtifactEndpoints {
    fn default() -> Self {
        Self {
            document: "http://localhost:8002".to_owned(),
            chart: "http://localhost:8003".to_owned(),
            api_doc: "http://localhost:8005".to_owned(),
            file: "http://localhost:8000/static".to_owned(),
        }
    }
}

impl ArtifactEndpoints {
    pub fn url_for(&self, kind: ArtifactKind, filename: &str) -> String {
        let (base, route) = match kind {
            ArtifactKind::Document => (&self.document, "/download/"),
            ArtifactKind::Chart => (&self.chart, "/download/"),
            ArtifactKind::ApiDoc => (&self.api_doc, "/download/"),
            ArtifactKind::File => (&self.file, "/"),
        };
        format!(
            "{}{route}{}",
            base.trim_end_matches('/'),
            urlencoding::encode(filename)
        )
    }
}

/// A client-side reference to a downloadable artifact.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DownloadRef {
    pub kind: ArtifactKind,
    /// The path exactly as the service reported it.
    pub source_path: String,
    pub filename: String,
    pub url: String,
}

impl DownloadRef {
    /// Derive a download reference from a task result, if it names an artifact.
    pub fn from_result(result: &Value, endpoints: &ArtifactEndpoints) -> Option<Self> {
        ArtifactKind::FIELDS.iter().find_map(|(field, kind)| {
            let path = result.get(field)?.as_str()?;
            let filename = artifact_filename(path)?;
            Some(Self {
                kind: *kind,
                source_path: path.to_owned(),
                url: endpoints.url_for(*kind, filename),
                filename: filename.to_owned(),
            })
        })
    }
}

/// The final segment of a path reported by a tool service, on any platform.
///
/// ```
/// # use taskwatch::job::artifact::artifact_filename;
/// assert_eq!(artifact_filename("C:\\out\\x\\report.pdf"), Some("report.pdf"));
/// assert_eq!(artifact_filename("/srv/charts/bar.png"), Some("bar.png"));
/// assert_eq!(artifact_filename("/srv/charts/"), None);
/// ```
pub fn artifact_filename(path: &str) -> Option<&str> {
    path.rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn windows_path_resolves_to_filename() {
        let result = json!({"artifact_path": "C:\\out\\x\\report.pdf"});

        let download = DownloadRef::from_result(&result, &ArtifactEndpoints::default()).unwrap();

        assert_eq!(download.filename, "report.pdf");
        assert_eq!(download.kind, ArtifactKind::File);
        assert_eq!(download.url, "http://localhost:8000/static/report.pdf");
        assert_eq!(download.source_path, "C:\\out\\x\\report.pdf");
    }

    #[test]
    fn filename_is_encoded_in_url() {
        let result = json!({"pdf_path": "/srv/out/Q3 report#1.pdf"});

        let download = DownloadRef::from_result(&result, &ArtifactEndpoints::default()).unwrap();

        assert_eq!(download.filename, "Q3 report#1.pdf");
        assert_eq!(download.url, "http://localhost:8002/download/Q3%20report%231.pdf");
    }

    #[test]
    fn mixed_separators() {
        assert_eq!(artifact_filename("out\\charts/q3\\sales.png"), Some("sales.png"));
        assert_eq!(artifact_filename("report.pdf"), Some("report.pdf"));
        assert_eq!(artifact_filename(""), None);
    }

    #[test]
    fn kind_selects_service() {
        let endpoints = ArtifactEndpoints {
            chart: "https://charts.example.com/".to_owned(),
            ..Default::default()
        };

        let download =
            DownloadRef::from_result(&json!({"image_path": "/tmp/charts/bar.png"}), &endpoints)
                .unwrap();
        assert_eq!(download.kind, ArtifactKind::Chart);
        assert_eq!(download.url, "https://charts.example.com/download/bar.png");

        let download =
            DownloadRef::from_result(&json!({"pdf_path": "/tmp/deck.pdf"}), &endpoints).unwrap();
        assert_eq!(download.url, "http://localhost:8002/download/deck.pdf");
    }

    #[test]
    fn no_artifact() {
        let endpoints = ArtifactEndpoints::default();
        assert_eq!(DownloadRef::from_result(&json!({"event_id": "e1"}), &endpoints), None);
        assert_eq!(DownloadRef::from_result(&json!({"pdf_path": null}), &endpoints), None);
        assert_eq!(DownloadRef::from_result(&json!("report.pdf"), &endpoints), None);
    }
}
