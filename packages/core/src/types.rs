use serde_json::Value as Json;

/// An opaque, user-supplied document: queue metadata or a message body.
///
/// Neither the queue, message, nor claim controller ever inspects the
/// contents — it is round-tripped verbatim, the way the original
/// document-store-backed driver treats these sub-documents as opaque.
pub type Document = Json;

/// Returns the empty-object document used as the default for queue metadata
/// and message bodies.
#[must_use]
pub fn empty_document() -> Document {
    Json::Object(serde_json::Map::new())
}
