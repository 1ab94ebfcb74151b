//! Converter and item-size registry
//!
//! One registry is built at startup and handed to whatever constructs
//! streamers. Lookups take a read lock; registration serializes on the write
//! lock, so late registrations are safe but should be rare.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{item32, sc12, tables, ConvertId, Converter, ConverterFactory, Priority};
use crate::error::ConvertError;

/// Table of converter factories and wire item sizes
pub struct ConvertRegistry {
    converters: RwLock<HashMap<ConvertId, BTreeMap<Priority, ConverterFactory>>>,
    item_sizes: RwLock<HashMap<String, usize>>,
}

impl ConvertRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            converters: RwLock::new(HashMap::new()),
            item_sizes: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry holding the standard item sizes and all built-in
    /// converters
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_standard_item_sizes();
        item32::register(&registry);
        sc12::register(&registry);
        tables::register(&registry);
        registry
    }

    fn register_standard_item_sizes(&self) {
        // complex types
        self.register_bytes_per_item("fc64", 16);
        self.register_bytes_per_item("fc32", 8);
        self.register_bytes_per_item("sc64", 16);
        self.register_bytes_per_item("sc32", 8);
        self.register_bytes_per_item("sc16", 4);
        self.register_bytes_per_item("sc8", 2);

        // real types
        self.register_bytes_per_item("f64", 8);
        self.register_bytes_per_item("f32", 4);
        self.register_bytes_per_item("s64", 8);
        self.register_bytes_per_item("s32", 4);
        self.register_bytes_per_item("s16", 2);
        self.register_bytes_per_item("s8", 1);
        self.register_bytes_per_item("u8", 1);

        // VITA word
        self.register_bytes_per_item("item32", 4);
    }

    /// Register a factory for `id` at `priority`, replacing any previous
    /// factory at the same priority.
    pub fn register_converter<F>(&self, id: ConvertId, factory: F, priority: Priority)
    where
        F: Fn() -> Box<dyn Converter> + Send + Sync + 'static,
    {
        tracing::debug!(%id, priority, "register_converter");
        self.converters
            .write()
            .entry(id)
            .or_default()
            .insert(priority, Arc::new(factory));
    }

    /// Look up a converter factory.
    ///
    /// With `priority == None` the highest registered priority is returned.
    /// A concrete priority must match exactly.
    pub fn get_converter(
        &self,
        id: &ConvertId,
        priority: Option<Priority>,
    ) -> Result<ConverterFactory, ConvertError> {
        let table = self.converters.read();
        let by_priority = table
            .get(id)
            .filter(|entries| !entries.is_empty())
            .ok_or_else(|| ConvertError::NoConverter { id: id.clone() })?;

        let (chosen, factory) = match priority {
            Some(prio) => by_priority
                .get_key_value(&prio)
                .ok_or_else(|| ConvertError::NoConverterAtPriority {
                    id: id.clone(),
                    priority: prio,
                })?,
            None => by_priority
                .last_key_value()
                .ok_or_else(|| ConvertError::NoConverter { id: id.clone() })?,
        };

        tracing::debug!(%id, priority = *chosen, "get_converter");
        Ok(Arc::clone(factory))
    }

    /// Look up a factory and build an instance from it
    pub fn make_converter(
        &self,
        id: &ConvertId,
        priority: Option<Priority>,
    ) -> Result<Box<dyn Converter>, ConvertError> {
        let factory = self.get_converter(id, priority)?;
        Ok(factory())
    }

    /// Priorities registered for `id`, ascending
    pub fn priorities(&self, id: &ConvertId) -> Vec<Priority> {
        self.converters
            .read()
            .get(id)
            .map(|entries| entries.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn register_bytes_per_item(&self, format: &str, size: usize) {
        self.item_sizes.write().insert(format.to_string(), size);
    }

    /// Bytes per item of a format tag.
    ///
    /// Compound tags such as `sc12_item32_le` fall back to their prefix one
    /// `_` segment at a time until a registered tag is found.
    pub fn get_bytes_per_item(&self, format: &str) -> Result<usize, ConvertError> {
        let sizes = self.item_sizes.read();
        let mut tag = format;
        loop {
            if let Some(&size) = sizes.get(tag) {
                return Ok(size);
            }
            match tag.rfind('_') {
                Some(pos) => tag = &tag[..pos],
                None => return Err(ConvertError::UnknownItemSize(format.to_string())),
            }
        }
    }
}

impl Default for ConvertRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{InputBuffer, OutputBuffer};

    /// Writes its tag into the first output byte so tests can tell
    /// factories apart
    struct TagConverter(u8);

    impl Converter for TagConverter {
        fn set_scalar(&mut self, _scalar: f64) {}

        fn convert(&mut self, _inputs: &[InputBuffer<'_>], outputs: &mut [OutputBuffer<'_>], _nsamps: usize) {
            outputs[0].data()[0] = self.0;
        }
    }

    fn tag_of(factory: &ConverterFactory) -> u8 {
        let mut converter = factory();
        let mut out = [0u8; 1];
        converter.convert(&[], &mut [OutputBuffer::new(&mut out)], 1);
        out[0]
    }

    fn test_id() -> ConvertId {
        ConvertId::single("test_in", "test_out")
    }

    #[test]
    fn test_priority_selection() {
        let registry = ConvertRegistry::new();
        registry.register_converter(test_id(), || Box::new(TagConverter(1)), 1);
        registry.register_converter(test_id(), || Box::new(TagConverter(5)), 5);

        let best = registry.get_converter(&test_id(), None).unwrap();
        assert_eq!(tag_of(&best), 5);

        let pinned = registry.get_converter(&test_id(), Some(1)).unwrap();
        assert_eq!(tag_of(&pinned), 1);

        let missing = registry.get_converter(&test_id(), Some(99));
        assert!(matches!(
            missing,
            Err(ConvertError::NoConverterAtPriority { priority: 99, .. })
        ));
        assert_eq!(registry.priorities(&test_id()), vec![1, 5]);
    }

    #[test]
    fn test_custom_converter_outranks_builtins() {
        let registry = ConvertRegistry::with_defaults();
        let id = ConvertId::single("sc16_item32_be", "fc32");
        registry.register_converter(id.clone(), || Box::new(TagConverter(9)), crate::convert::PRIORITY_CUSTOM);

        let best = registry.get_converter(&id, None).unwrap();
        assert_eq!(tag_of(&best), 9);
        assert!(registry.get_converter(&id, Some(crate::convert::PRIORITY_TABLE)).is_ok());
    }

    #[test]
    fn test_overwrite_same_priority() {
        let registry = ConvertRegistry::new();
        registry.register_converter(test_id(), || Box::new(TagConverter(1)), 2);
        registry.register_converter(test_id(), || Box::new(TagConverter(7)), 2);

        let factory = registry.get_converter(&test_id(), Some(2)).unwrap();
        assert_eq!(tag_of(&factory), 7);
    }

    #[test]
    fn test_unknown_id_names_formats() {
        let registry = ConvertRegistry::new();
        let err = registry
            .get_converter(&ConvertId::single("nope", "fc32"), None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("nope (1) -> fc32 (1)"));
    }

    #[test]
    fn test_bytes_per_item_fallback() {
        let registry = ConvertRegistry::with_defaults();
        assert_eq!(
            registry.get_bytes_per_item("sc16_foo").unwrap(),
            registry.get_bytes_per_item("sc16").unwrap()
        );
        assert_eq!(registry.get_bytes_per_item("sc12_item32_le").unwrap(), 3);
        assert_eq!(registry.get_bytes_per_item("item32").unwrap(), 4);
        assert!(matches!(
            registry.get_bytes_per_item("totally_unknown"),
            Err(ConvertError::UnknownItemSize(_))
        ));
    }

    #[test]
    fn test_bytes_per_item_prefers_longest_registered_tag() {
        let registry = ConvertRegistry::with_defaults();
        registry.register_bytes_per_item("sc16_item32", 4);
        registry.register_bytes_per_item("sc16_item32_wide", 6);
        assert_eq!(registry.get_bytes_per_item("sc16_item32_wide_x").unwrap(), 6);
    }

    #[test]
    fn test_defaults_register_wire_converters() {
        let registry = ConvertRegistry::with_defaults();
        for order in ["be", "le"] {
            let otw = format!("sc16_item32_{order}");
            assert!(registry.get_converter(&ConvertId::single(&otw, "fc32"), None).is_ok());
            assert!(registry.get_converter(&ConvertId::single("fc32", &otw), None).is_ok());
            assert!(registry.get_converter(&ConvertId::single("sc16", &otw), None).is_ok());

            let sc12 = format!("sc12_item32_{order}");
            assert!(registry.get_converter(&ConvertId::single(&sc12, "fc32"), None).is_ok());
            assert!(registry.get_converter(&ConvertId::single("fc64", &sc12), None).is_ok());
        }
    }
}
