//! Request body parsers keyed by media type, and the query-string decoder.
//!
//! A parser turns raw body bytes into a [`Value`]. Anything that is not an
//! object, an array or `Null` is rejected by the request when the parser
//! runs, so implementations are free to return `Null` on malformed input.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

pub trait BodyParser: Send + Sync {
    fn parse(&self, body: &[u8]) -> Value;
}

impl<F> BodyParser for F
where
    F: Fn(&[u8]) -> Value + Send + Sync,
{
    fn parse(&self, body: &[u8]) -> Value {
        self(body)
    }
}

pub struct JsonParser;

impl BodyParser for JsonParser {
    fn parse(&self, body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap_or(Value::Null)
    }
}

pub struct FormParser;

impl BodyParser for FormParser {
    fn parse(&self, body: &[u8]) -> Value {
        Value::Object(parse_query(&String::from_utf8_lossy(body)))
    }
}

/// XML documents mapped onto objects: attributes under `@attributes`,
/// repeated child elements as arrays, text-only elements as strings.
///
/// Documents with a DTD are refused, so no entity is ever expanded.
pub struct XmlParser;

impl BodyParser for XmlParser {
    fn parse(&self, body: &[u8]) -> Value {
        let text = String::from_utf8_lossy(body);
        let doc = match roxmltree::Document::parse(&text) {
            Ok(doc) => doc,
            Err(err) => {
                tracing::debug!(error = %err, "Fail to parse XML body");
                return Value::Null;
            }
        };

        match element_to_value(doc.root_element()) {
            Value::String(text) => {
                let mut map = Map::new();
                map.insert("#text".to_string(), Value::String(text));
                Value::Object(map)
            }
            value => value,
        }
    }
}

fn element_to_value(node: roxmltree::Node<'_, '_>) -> Value {
    let attributes: Map<String, Value> = node
        .attributes()
        .map(|attr| (attr.name().to_string(), Value::String(attr.value().to_string())))
        .collect();

    let mut children: IndexMap<String, Vec<Value>> = IndexMap::new();
    let mut text = String::new();
    for child in node.children() {
        if child.is_element() {
            children
                .entry(child.tag_name().name().to_string())
                .or_default()
                .push(element_to_value(child));
        } else if child.is_text() {
            text.push_str(child.text().unwrap_or_default());
        }
    }
    let text = text.trim();

    if attributes.is_empty() && children.is_empty() {
        return Value::String(text.to_string());
    }

    let mut map = Map::new();
    if !attributes.is_empty() {
        map.insert("@attributes".to_string(), Value::Object(attributes));
    }
    for (name, mut values) in children {
        let value = match values.len() {
            1 => values.remove(0),
            _ => Value::Array(values),
        };
        map.insert(name, value);
    }
    if !text.is_empty() {
        map.insert("#text".to_string(), Value::String(text.to_string()));
    }
    Value::Object(map)
}

/// Media type to parser registry. Lookups are case-insensitive.
#[derive(Clone)]
pub struct BodyParsers(IndexMap<String, Arc<dyn BodyParser>>);

impl BodyParsers {
    pub fn empty() -> Self {
        Self(IndexMap::new())
    }

    pub fn register(&mut self, media_type: &str, parser: impl BodyParser + 'static) {
        self.0
            .insert(media_type.trim().to_ascii_lowercase(), Arc::new(parser));
    }

    pub fn get(&self, media_type: &str) -> Option<&dyn BodyParser> {
        self.0
            .get(&media_type.to_ascii_lowercase())
            .map(|parser| parser.as_ref())
    }

    pub fn media_types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl Default for BodyParsers {
    fn default() -> Self {
        let mut parsers = Self::empty();
        parsers.register("application/json", JsonParser);
        parsers.register("application/x-www-form-urlencoded", FormParser);
        parsers.register("application/xml", XmlParser);
        parsers.register("text/xml", XmlParser);
        parsers
    }
}

impl fmt::Debug for BodyParsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BodyParsers")
            .field(&self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Base media type of a `Content-Type` value, lowercased, without parameters.
pub fn media_type(content_type: &str) -> Option<String> {
    let base = content_type.split([';', ',']).next()?.trim();
    (!base.is_empty()).then(|| base.to_ascii_lowercase())
}

/// `Content-Type` parameters; names are lowercased, values kept as sent.
pub fn media_type_params(content_type: &str) -> IndexMap<String, String> {
    content_type
        .split([';', ','])
        .skip(1)
        .filter_map(|param| {
            let (name, value) = param.split_once('=')?;
            Some((name.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// Collapses an RFC 6839 structured syntax suffix:
/// `application/vnd.api+json` -> `application/json`.
pub fn parser_media_type(media_type: &str) -> String {
    match media_type.rsplit_once('+') {
        Some((_, suffix)) => format!("application/{suffix}"),
        None => media_type.to_string(),
    }
}

/// Decodes a query string with bracket nesting:
/// `a[]=1&a[]=2&b[c]=3` -> `{"a": ["1", "2"], "b": {"c": "3"}}`.
///
/// Later keys win; a key with an empty base name is dropped.
pub fn parse_query(query: &str) -> Map<String, Value> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();

    let mut root = Map::new();
    for (key, value) in pairs {
        let (base, path) = split_key(&key);
        if base.is_empty() {
            continue;
        }
        insert_nested(&mut root, base.to_string(), &path, value);
    }

    root.into_iter().map(|(key, value)| (key, listify(value))).collect()
}

fn split_key(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };
    if !key[open..].contains(']') {
        return (key, Vec::new());
    }

    let mut path = Vec::new();
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            break;
        };
        path.push(&inner[..close]);
        rest = &inner[close + 1..];
    }
    (&key[..open], path)
}

fn insert_nested(target: &mut Map<String, Value>, key: String, path: &[&str], value: String) {
    let key = if key.is_empty() {
        next_index(target).to_string()
    } else {
        key
    };

    match path.split_first() {
        None => {
            target.insert(key, Value::String(value));
        }
        Some((next, rest)) => {
            let entry = target
                .entry(key)
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_nested(child, next.to_string(), rest, value);
            }
        }
    }
}

fn next_index(map: &Map<String, Value>) -> usize {
    map.keys()
        .filter_map(|key| key.parse::<usize>().ok())
        .map(|index| index + 1)
        .max()
        .unwrap_or(0)
}

/// Objects keyed exactly `0..n` in order become arrays.
fn listify(value: Value) -> Value {
    let Value::Object(map) = value else {
        return value;
    };

    let sequential = !map.is_empty()
        && map
            .keys()
            .enumerate()
            .all(|(index, key)| key.parse::<usize>() == Ok(index));
    if sequential {
        Value::Array(map.into_iter().map(|(_, value)| listify(value)).collect())
    } else {
        Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, listify(value)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_query() {
        let query = parse_query("a=1&b=two+words&c=%26");
        assert_eq!(Value::Object(query), json!({"a": "1", "b": "two words", "c": "&"}));
    }

    #[test]
    fn bracket_query() {
        let query = parse_query("list[]=1&list[]=2&user[name]=ann&user[tags][]=x&a=1&a=2");
        assert_eq!(
            Value::Object(query),
            json!({
                "list": ["1", "2"],
                "user": {"name": "ann", "tags": ["x"]},
                "a": "2"
            })
        );
    }

    #[test]
    fn odd_keys() {
        let query = parse_query("=x&[a]=y&b[=z&c[1]=q");
        assert_eq!(Value::Object(query), json!({"b[": "z", "c": {"1": "q"}}));
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn json_bodies() {
        assert_eq!(JsonParser.parse(br#"{"a":[1,2]}"#), json!({"a": [1, 2]}));
        assert_eq!(JsonParser.parse(b"{not json"), Value::Null);
        assert_eq!(JsonParser.parse(b"5"), json!(5));
    }

    #[test]
    fn form_bodies() {
        assert_eq!(FormParser.parse(b"_METHOD=PUT&x[]=1"), json!({"_METHOD": "PUT", "x": ["1"]}));
    }

    #[test]
    fn xml_bodies() {
        let body = br#"<user id="7"><name>ann</name><tag>a</tag><tag>b</tag></user>"#;
        assert_eq!(
            XmlParser.parse(body),
            json!({"@attributes": {"id": "7"}, "name": "ann", "tag": ["a", "b"]})
        );
        assert_eq!(XmlParser.parse(b"<a>text</a>"), json!({"#text": "text"}));
        assert_eq!(XmlParser.parse(b"<broken"), Value::Null);
    }

    #[test]
    fn xml_refuses_dtd() {
        let body = br#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<foo>&xxe;</foo>"#;
        assert_eq!(XmlParser.parse(body), Value::Null);
    }

    #[test]
    fn media_types() {
        let content_type = "Application/JSON; Charset=UTF-8, foo=Bar";
        assert_eq!(media_type(content_type).unwrap(), "application/json");
        let params = media_type_params(content_type);
        assert_eq!(params["charset"], "UTF-8");
        assert_eq!(params["foo"], "Bar");
        assert!(media_type("").is_none());

        assert_eq!(parser_media_type("application/vnd.api+json"), "application/json");
        assert_eq!(parser_media_type("image/svg+xml"), "application/xml");
        assert_eq!(parser_media_type("text/plain"), "text/plain");
    }

    #[test]
    fn registry() {
        let mut parsers = BodyParsers::default();
        assert!(parsers.get("TEXT/XML").is_some());
        assert!(parsers.get("text/csv").is_none());

        parsers.register("text/csv", |body: &[u8]| json!([String::from_utf8_lossy(body)]));
        assert_eq!(parsers.get("text/csv").unwrap().parse(b"a,b"), json!(["a,b"]));
        assert_eq!(parsers.media_types().count(), 5);
    }
}
