use log::{
    Record,
    kv::{self, Key, Value, VisitSource},
};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::encode::{Color, Encode, Style, Write};
use serde::Deserialize;

use super::mask_string;

const DEFAULT_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l}):5} {t} - {m}";

/// Keys whose values are masked before they reach any appender.
const SENSITIVE_KEYS: &[&str] = &["pubkey", "public_key", "sig", "signature", "private_key"];

#[derive(Debug, Deserialize)]
pub struct StructuredConsoleEncoderConfig {
    pub pattern: Option<String>,
}

/// Pattern encoder that appends the record's key/value pairs as
/// ` key=value`, masking credential-like keys.
#[derive(Debug)]
pub struct StructuredConsoleEncoder {
    delegate: PatternEncoder,
}

impl StructuredConsoleEncoder {
    pub fn new(pattern: &str) -> Self {
        Self {
            delegate: PatternEncoder::new(pattern),
        }
    }
}

impl Encode for StructuredConsoleEncoder {
    fn encode(&self, w: &mut dyn Write, record: &Record) -> anyhow::Result<()> {
        self.delegate.encode(w, record)?;

        let mut pairs = PairCollector::default();
        if let Err(e) = record.key_values().visit(&mut pairs) {
            pairs.fields.push(("kv_error".to_string(), e.to_string()));
        }

        for (key, value) in &pairs.fields {
            w.set_style(Style::new().text(Color::Cyan))?;
            write!(w, " {}=", key)?;
            w.set_style(&Style::default())?;
            write!(w, "{}", value)?;
        }

        w.write_all(b"\n")?;
        Ok(())
    }
}

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn render_value(key: &str, value: &Value<'_>) -> String {
    let rendered = value.to_string();
    if is_sensitive(key) { mask_string(&rendered) } else { rendered }
}

/// Renders every pair up front so write errors surface from `encode` directly.
#[derive(Default)]
struct PairCollector {
    fields: Vec<(String, String)>,
}

impl<'kvs> VisitSource<'kvs> for PairCollector {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        let rendered = render_value(key.as_str(), &value);
        self.fields.push((key.as_str().to_string(), rendered));
        Ok(())
    }
}

pub struct StructuredConsoleEncoderDeserializer;

impl log4rs::config::Deserialize for StructuredConsoleEncoderDeserializer {
    type Trait = dyn Encode;
    type Config = StructuredConsoleEncoderConfig;

    fn deserialize(
        &self,
        config: StructuredConsoleEncoderConfig,
        _: &log4rs::config::Deserializers,
    ) -> anyhow::Result<Box<dyn Encode>> {
        let pattern = config.pattern.as_deref().unwrap_or(DEFAULT_PATTERN);
        Ok(Box::new(StructuredConsoleEncoder::new(pattern)))
    }
}
