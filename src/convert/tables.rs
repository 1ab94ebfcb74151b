//! Lookup-table sc16_item32 -> fc32
//!
//! Each 16-bit half of a wire word indexes a 64K-entry table filled when the
//! scalar is set. Registered above the general converter so it is picked by
//! default.

use std::marker::PhantomData;

use super::{
    BigEndian, ConvertId, ConvertRegistry, Converter, InputBuffer, LittleEndian, OutputBuffer,
    WireOrder, PRIORITY_TABLE,
};

const TABLE_SIZE: usize = 1 << 16;

pub struct Item32ToFc32Table<O> {
    table: Vec<f32>,
    _marker: PhantomData<fn() -> O>,
}

impl<O: WireOrder> Item32ToFc32Table<O> {
    pub fn new() -> Self {
        let mut converter = Self {
            table: vec![0.0; TABLE_SIZE],
            _marker: PhantomData,
        };
        converter.set_scalar(1.0);
        converter
    }
}

impl<O: WireOrder> Default for Item32ToFc32Table<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: WireOrder> Converter for Item32ToFc32Table<O> {
    fn set_scalar(&mut self, scalar: f64) {
        for (index, entry) in self.table.iter_mut().enumerate() {
            *entry = ((index as u16 as i16) as f64 * scalar) as f32;
        }
    }

    fn convert(&mut self, inputs: &[InputBuffer<'_>], outputs: &mut [OutputBuffer<'_>], nsamps: usize) {
        let input = &inputs[0];
        let in_start = input.offset() * 4;
        let src = &input.data()[in_start..in_start + nsamps * 4];

        let out_offset = outputs[0].offset();
        let dst = &mut outputs[0].data()[out_offset * 8..(out_offset + nsamps) * 8];

        for (word, out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(8)) {
            let item = O::to_host([word[0], word[1], word[2], word[3]]);
            let i = self.table[(item >> 16) as usize];
            let q = self.table[(item & 0xffff) as usize];
            out[..4].copy_from_slice(&i.to_ne_bytes());
            out[4..].copy_from_slice(&q.to_ne_bytes());
        }
    }
}

fn register_order<O: WireOrder>(registry: &ConvertRegistry) {
    registry.register_converter(
        ConvertId::single(super::item32_format("sc16", O::ORDER), "fc32"),
        || Box::new(Item32ToFc32Table::<O>::new()),
        PRIORITY_TABLE,
    );
}

pub(crate) fn register(registry: &ConvertRegistry) {
    register_order::<BigEndian>(registry);
    register_order::<LittleEndian>(registry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{item32::Item32ToFloat, PRIORITY_GENERAL};

    #[test]
    fn test_table_matches_general_converter() {
        let words: Vec<u8> = [0x7fff_8001u32, 0x0000_ffff, 0x1234_edcb, 0x8000_7fff]
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .collect();
        let scalar = 1.0 / 32767.0;

        let mut table = Item32ToFc32Table::<BigEndian>::new();
        table.set_scalar(scalar);
        let mut general = Item32ToFloat::<f32, BigEndian>::new();
        general.set_scalar(scalar);

        let mut a = vec![0u8; 4 * 8];
        let mut b = vec![0u8; 4 * 8];
        table.convert(&[InputBuffer::new(&words)], &mut [OutputBuffer::new(&mut a)], 4);
        general.convert(&[InputBuffer::new(&words)], &mut [OutputBuffer::new(&mut b)], 4);
        assert_eq!(a, b);
    }

    #[test]
    fn test_table_wins_by_default() {
        let registry = ConvertRegistry::with_defaults();
        let id = ConvertId::single("sc16_item32_le", "fc32");
        assert_eq!(registry.priorities(&id), vec![PRIORITY_GENERAL, PRIORITY_TABLE]);
    }
}
