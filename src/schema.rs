use std::collections::HashMap;

/// Editor-only widget slot (`"fixed"`, `"randomize"`, ...) that follows a
/// seed. It occupies a position but is never sent as an input.
pub const SEED_CONTROL: &str = "seed_control";

const BUILTIN: &[(&str, &[&str])] = &[
    (
        "KSampler",
        &[
            "seed",
            SEED_CONTROL,
            "steps",
            "cfg",
            "sampler_name",
            "scheduler",
            "denoise",
        ],
    ),
    ("CLIPTextEncode", &["text"]),
    ("EmptyLatentImage", &["width", "height", "batch_size"]),
    ("CheckpointLoaderSimple", &["ckpt_name"]),
    ("SaveImage", &["filename_prefix"]),
    ("PreviewImage", &[]),
    ("VAEDecode", &[]),
    ("VAEEncode", &[]),
    ("VAELoader", &["vae_name"]),
    ("LoraLoader", &["lora_name", "strength_model", "strength_clip"]),
    ("ControlNetLoader", &["control_net_name"]),
    ("LoadImage", &["image", "upload"]),
    ("ImageScale", &["upscale_method", "width", "height", "crop"]),
];

/// Ordered widget parameter names per node type.
///
/// Editor files store widget values positionally; this table names them.
/// Node types that are not registered contribute no widget inputs.
///
/// # Example
/// ```
/// use comfyui_workflow::WidgetSchema;
///
/// let mut schema = WidgetSchema::default();
/// schema.register("CLIPSetLastLayer", ["stop_at_clip_layer"]);
/// assert_eq!(schema.params("CLIPSetLastLayer"), ["stop_at_clip_layer"]);
/// assert!(schema.params("UnknownNode").is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct WidgetSchema {
    params: HashMap<String, Vec<String>>,
}

impl Default for WidgetSchema {
    /// The builtin table for core ComfyUI nodes.
    fn default() -> Self {
        let mut schema = Self::empty();
        for (node_type, names) in BUILTIN {
            schema.register(*node_type, names.iter().copied());
        }
        schema
    }
}

impl WidgetSchema {
    /// A schema with no registered node types.
    pub fn empty() -> Self {
        Self {
            params: HashMap::new(),
        }
    }

    /// Register (or replace) the widget parameter order for a node type.
    pub fn register<I, S>(&mut self, node_type: impl Into<String>, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params
            .insert(node_type.into(), names.into_iter().map(Into::into).collect());
        self
    }

    /// Parameter names for `node_type`, empty for unregistered types.
    pub fn params(&self, node_type: &str) -> &[String] {
        self.params.get(node_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.params.contains_key(node_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ksampler_order() {
        let schema = WidgetSchema::default();
        assert_eq!(
            schema.params("KSampler"),
            [
                "seed",
                "seed_control",
                "steps",
                "cfg",
                "sampler_name",
                "scheduler",
                "denoise"
            ]
        );
    }

    #[test]
    fn test_registered_with_no_params() {
        let schema = WidgetSchema::default();
        assert!(schema.contains("VAEDecode"));
        assert!(schema.params("VAEDecode").is_empty());
        assert!(!schema.contains("MyCustomNode"));
    }

    #[test]
    fn test_register_overrides_builtin() {
        let mut schema = WidgetSchema::default();
        schema.register("SaveImage", ["filename_prefix", "format"]);
        assert_eq!(schema.params("SaveImage").len(), 2);
    }

    #[test]
    fn test_empty_schema() {
        assert!(WidgetSchema::empty().params("KSampler").is_empty());
    }
}
