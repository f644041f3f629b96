//! Index template bootstrap
//!
//! Installs the index template covering `<alias>-*` before any write or
//! rollover happens. Labels map to `label.<name>` keyword fields, the
//! timestamp is an epoch-millis date, and the value is stored binary.
//! Re-running with the same parameters is a no-op on the cluster side;
//! changed shard/replica counts apply to future physical indices only.

use crate::elastic::api::ElasticApi;
use crate::elastic::error::EsError;
use serde_json::json;
use thiserror::Error;

/// Template installation failure. Fatal at startup: the bridge cannot
/// safely write without the schema in place.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to install index template: {0}")]
    Install(#[from] EsError),
}

/// Install (or update) the index template for `alias`.
pub async fn ensure_template(
    api: &dyn ElasticApi,
    alias: &str,
    shards: u32,
    replicas: u32,
) -> Result<(), TemplateError> {
    let body = template_body(alias, shards, replicas);
    api.put_index_template(alias, body).await?;
    tracing::info!(alias, shards, replicas, "Index template installed");
    Ok(())
}

/// Template body covering every generation of the alias.
pub fn template_body(alias: &str, shards: u32, replicas: u32) -> serde_json::Value {
    json!({
        "index_patterns": [format!("{alias}-*")],
        "template": {
            "settings": {
                "number_of_shards": shards,
                "number_of_replicas": replicas
            },
            "mappings": {
                "_source": { "enabled": true },
                "dynamic": true,
                "dynamic_templates": [
                    {
                        "labels": {
                            "match_mapping_type": "string",
                            "path_match": "label.*",
                            "mapping": { "type": "keyword" }
                        }
                    }
                ],
                "properties": {
                    "timestamp": {
                        "type": "date",
                        "format": "strict_date_optional_time||epoch_millis"
                    },
                    "value": { "type": "binary" }
                }
            }
        }
    })
}
