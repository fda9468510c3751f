//! Per-cell data layers.
//!
//! A `Layer<T>` is a fixed-size row-major buffer holding one `T` per grid
//! cell. Integer layers may carry a `LookupTable<TileKind>`, in which case
//! the stored values are record indices rather than raw numbers.
//!
//! Lookup layers always index `TileKind` records. `LookupTable` itself is
//! generic over any `Record`, but a layer that resolves cells through some
//! other record type needs its own wrapper around `Layer<T>`.
//!
//! A grid keeps layers of different element types side by side, so they are
//! stored type-erased as `AnyLayer` and recovered with `LayerElement`.

use crate::error::{Result, SimError};
use crate::lookup::LookupTable;
use crate::tiles::{TileKind, TileOverride};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;

/// Element type of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    F32,
    U8,
    U16,
    I16,
}

/// Scalar type that can back a layer.
pub trait LayerElement: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    const KIND: LayerKind;

    /// Interpret the value as a lookup-table index.
    fn to_index(self) -> Option<usize>;
    /// Convert a lookup-table index back to a value, if it fits.
    fn from_index(index: usize) -> Option<Self>;
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;

    fn wrap(layer: Layer<Self>) -> AnyLayer;
    fn downcast_ref(layer: &AnyLayer) -> Option<&Layer<Self>>;
    fn downcast_mut(layer: &mut AnyLayer) -> Option<&mut Layer<Self>>;
}

macro_rules! layer_element {
    ($ty:ty, $kind:ident) => {
        impl LayerElement for $ty {
            const KIND: LayerKind = LayerKind::$kind;

            #[inline]
            fn to_index(self) -> Option<usize> {
                usize::try_from(self).ok()
            }

            #[inline]
            fn from_index(index: usize) -> Option<Self> {
                <$ty>::try_from(index).ok()
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            fn wrap(layer: Layer<Self>) -> AnyLayer {
                AnyLayer::$kind(layer)
            }

            fn downcast_ref(layer: &AnyLayer) -> Option<&Layer<Self>> {
                match layer {
                    AnyLayer::$kind(l) => Some(l),
                    _ => None,
                }
            }

            fn downcast_mut(layer: &mut AnyLayer) -> Option<&mut Layer<Self>> {
                match layer {
                    AnyLayer::$kind(l) => Some(l),
                    _ => None,
                }
            }
        }
    };
}

layer_element!(u8, U8);
layer_element!(u16, U16);
layer_element!(i16, I16);

impl LayerElement for f32 {
    const KIND: LayerKind = LayerKind::F32;

    #[inline]
    fn to_index(self) -> Option<usize> {
        (self >= 0.0 && self.fract() == 0.0).then_some(self as usize)
    }

    #[inline]
    fn from_index(index: usize) -> Option<Self> {
        Some(index as f32)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn wrap(layer: Layer<Self>) -> AnyLayer {
        AnyLayer::F32(layer)
    }

    fn downcast_ref(layer: &AnyLayer) -> Option<&Layer<Self>> {
        match layer {
            AnyLayer::F32(l) => Some(l),
            _ => None,
        }
    }

    fn downcast_mut(layer: &mut AnyLayer) -> Option<&mut Layer<Self>> {
        match layer {
            AnyLayer::F32(l) => Some(l),
            _ => None,
        }
    }
}

// ============================================================================
// Layer<T>
// ============================================================================

/// Fixed-size typed buffer with one value per cell.
#[derive(Debug, Clone)]
pub struct Layer<T: LayerElement> {
    name: String,
    width: usize,
    height: usize,
    data: Vec<T>,
    table: Option<LookupTable<TileKind>>,
}

impl<T: LayerElement> Layer<T> {
    pub fn new(name: impl Into<String>, width: usize, height: usize) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            data: vec![T::default(); width * height],
            table: None,
        }
    }

    pub fn with_lookup(mut self, table: LookupTable<TileKind>) -> Self {
        self.table = Some(table);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        if x >= 0 && (x as usize) < self.width && y >= 0 && (y as usize) < self.height {
            Some(y as usize * self.width + x as usize)
        } else {
            None
        }
    }

    /// Direct access to the value array.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn table(&self) -> Option<&LookupTable<TileKind>> {
        self.table.as_ref()
    }

    pub fn table_mut(&mut self) -> Option<&mut LookupTable<TileKind>> {
        self.table.as_mut()
    }

    pub fn get(&self, x: i32, y: i32) -> Option<T> {
        self.index_of(x, y).map(|i| self.data[i])
    }

    pub fn get_index(&self, i: usize) -> Option<T> {
        self.data.get(i).copied()
    }

    /// Returns false when the coordinate is outside the layer.
    pub fn set(&mut self, x: i32, y: i32, value: T) -> bool {
        match self.index_of(x, y) {
            Some(i) => {
                self.data[i] = value;
                true
            }
            None => false,
        }
    }

    pub fn set_index(&mut self, i: usize, value: T) -> bool {
        match self.data.get_mut(i) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Record stored at the given coordinate.
    pub fn lookup(&self, x: i32, y: i32) -> Option<&TileKind> {
        self.index_of(x, y).and_then(|i| self.lookup_index(i))
    }

    pub fn lookup_index(&self, i: usize) -> Option<&TileKind> {
        let table = self.table.as_ref()?;
        let value = self.data.get(i)?;
        table.get(value.to_index()?)
    }

    /// Replace the cell's record with a derived variant carrying `overrides`.
    pub fn mutate(&mut self, x: i32, y: i32, overrides: &[TileOverride]) -> bool {
        match self.index_of(x, y) {
            Some(i) => self.mutate_index(i, overrides),
            None => false,
        }
    }

    pub fn mutate_index(&mut self, i: usize, overrides: &[TileOverride]) -> bool {
        let (Some(table), Some(value)) = (self.table.as_mut(), self.data.get(i).copied()) else {
            return false;
        };
        let Some(base) = value.to_index() else {
            return false;
        };
        let derived = table.get_derived(base, overrides);
        match T::from_index(derived) {
            Some(v) => {
                self.data[i] = v;
                true
            }
            None => {
                tracing::warn!(
                    layer = %self.name,
                    derived,
                    "derived record index does not fit layer type"
                );
                false
            }
        }
    }
}

// ============================================================================
// Type-erased layers
// ============================================================================

/// Layer of any supported element type.
#[derive(Debug, Clone)]
pub enum AnyLayer {
    F32(Layer<f32>),
    U8(Layer<u8>),
    U16(Layer<u16>),
    I16(Layer<i16>),
}

macro_rules! each_layer {
    ($self:expr, $l:ident => $body:expr) => {
        match $self {
            AnyLayer::F32($l) => $body,
            AnyLayer::U8($l) => $body,
            AnyLayer::U16($l) => $body,
            AnyLayer::I16($l) => $body,
        }
    };
}

impl AnyLayer {
    /// Build a `width`×`height` layer from its declaration.
    pub fn from_spec(name: &str, width: usize, height: usize, spec: LayerSpec) -> Result<Self> {
        fn build<T: LayerElement>(
            name: &str,
            width: usize,
            height: usize,
            spec: LayerSpec,
        ) -> Result<AnyLayer> {
            let mut layer = Layer::<T>::new(name, width, height);
            let default = match spec.default {
                DefaultValue::Value(v) => T::from_f64(v),
                DefaultValue::Record(record) => {
                    let index = spec
                        .lookup
                        .as_ref()
                        .and_then(|t| t.index_for_name(&record))
                        .ok_or_else(|| SimError::UnknownRecord(record.clone()))?;
                    T::from_index(index).ok_or(SimError::UnknownRecord(record))?
                }
            };
            layer.fill(default);
            if let Some(table) = spec.lookup {
                layer = layer.with_lookup(table);
            }
            Ok(T::wrap(layer))
        }

        match spec.kind {
            LayerKind::F32 => build::<f32>(name, width, height, spec),
            LayerKind::U8 => build::<u8>(name, width, height, spec),
            LayerKind::U16 => build::<u16>(name, width, height, spec),
            LayerKind::I16 => build::<i16>(name, width, height, spec),
        }
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            AnyLayer::F32(_) => LayerKind::F32,
            AnyLayer::U8(_) => LayerKind::U8,
            AnyLayer::U16(_) => LayerKind::U16,
            AnyLayer::I16(_) => LayerKind::I16,
        }
    }

    pub fn name(&self) -> &str {
        each_layer!(self, l => l.name())
    }

    pub fn len(&self) -> usize {
        each_layer!(self, l => l.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at a linear index, widened to f64.
    pub fn value_at(&self, i: usize) -> Option<f64> {
        each_layer!(self, l => l.get_index(i).map(LayerElement::to_f64))
    }

    pub fn lookup_index(&self, i: usize) -> Option<&TileKind> {
        each_layer!(self, l => l.lookup_index(i))
    }

    pub fn table(&self) -> Option<&LookupTable<TileKind>> {
        each_layer!(self, l => l.table())
    }
}

/// Initial value for a declared layer.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Value(f64),
    /// Name of a record in the layer's lookup table.
    Record(String),
}

/// Declaration of a layer: element type, default and optional lookup.
#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub kind: LayerKind,
    pub default: DefaultValue,
    pub lookup: Option<LookupTable<TileKind>>,
}

impl LayerSpec {
    pub fn new(kind: LayerKind) -> Self {
        Self {
            kind,
            default: DefaultValue::Value(0.0),
            lookup: None,
        }
    }

    pub fn default_value(mut self, value: f64) -> Self {
        self.default = DefaultValue::Value(value);
        self
    }

    pub fn default_record(mut self, name: impl Into<String>) -> Self {
        self.default = DefaultValue::Record(name.into());
        self
    }

    pub fn lookup(mut self, table: LookupTable<TileKind>) -> Self {
        self.lookup = Some(table);
        self
    }
}

/// Named layers of one grid.
pub type LayerSet = HashMap<String, AnyLayer>;

#[cfg(test)]
mod tests {
    use super::*;

    fn tile_spec() -> LayerSpec {
        let table = TileKind::table().with_table([
            ("grass", TileKind::new(true)),
            ("water", TileKind::new(false)),
        ]);
        LayerSpec::new(LayerKind::U8).default_record("grass").lookup(table)
    }

    #[test]
    fn test_get_set_bounds() {
        let mut layer = Layer::<f32>::new("height", 4, 4);
        assert!(layer.set(1, 2, 3.5));
        assert_eq!(layer.get(1, 2), Some(3.5));
        assert_eq!(layer.get_index(2 * 4 + 1), Some(3.5));
        assert!(!layer.set(4, 0, 1.0));
        assert!(!layer.set(-1, 0, 1.0));
        assert_eq!(layer.get(0, 4), None);
        assert_eq!(layer.len(), 16);
    }

    #[test]
    fn test_default_record_resolves() {
        let any = AnyLayer::from_spec("tile", 3, 3, tile_spec()).unwrap();
        assert_eq!(any.kind(), LayerKind::U8);
        let tiles = u8::downcast_ref(&any).unwrap();
        assert!(tiles.as_slice().iter().all(|&v| v == 0));
        assert_eq!(tiles.lookup(1, 1).unwrap().name, "grass");
    }

    #[test]
    fn test_unknown_default_record_errors() {
        let spec = tile_spec().default_record("lava");
        let err = AnyLayer::from_spec("tile", 3, 3, spec).unwrap_err();
        assert!(matches!(err, SimError::UnknownRecord(name) if name == "lava"));
    }

    #[test]
    fn test_mutate_derives_record() {
        let any = AnyLayer::from_spec("tile", 3, 3, tile_spec()).unwrap();
        let AnyLayer::U8(mut tiles) = any else {
            panic!("expected a u8 layer");
        };
        assert!(tiles.mutate(2, 0, &[TileOverride::Walkable(false)]));
        let tile = tiles.lookup(2, 0).unwrap();
        assert!(!tile.walkable);
        assert_eq!(tile.name, "grass-d0");

        // Same override on another cell reuses the derived record.
        assert!(tiles.mutate_index(4, &[TileOverride::Walkable(false)]));
        assert_eq!(tiles.get_index(4), tiles.get(2, 0));
        assert!(!tiles.mutate(9, 9, &[TileOverride::Walkable(false)]));
    }

    #[test]
    fn test_numeric_default_and_downcast() {
        let spec = LayerSpec::new(LayerKind::F32).default_value(0.5);
        let mut any = AnyLayer::from_spec("malleability", 2, 2, spec).unwrap();
        assert_eq!(any.value_at(3), Some(0.5));
        assert!(u8::downcast_ref(&any).is_none());
        f32::downcast_mut(&mut any).unwrap().set(0, 0, 1.0);
        assert_eq!(any.value_at(0), Some(1.0));
        assert!(any.lookup_index(0).is_none());
    }
}
