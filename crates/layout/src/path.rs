//! Navigation into nested layouts.
use std::fmt;

use smallvec::SmallVec;

use crate::{LayoutError, MemoryLayout};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathElement {
    /// Struct or union member by name.
    GroupElement(Box<str>),
    /// Struct or union member by position.
    GroupIndex(usize),
    /// Sequence element by index.
    SequenceElement(u64),
    /// Any sequence element; leaves a free dimension in the path.
    SequenceFree,
}

impl PathElement {
    pub fn group(name: &str) -> Self {
        Self::GroupElement(name.into())
    }

    pub fn sequence(index: u64) -> Self {
        Self::SequenceElement(index)
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GroupElement(name) => write!(f, "member `{name}`"),
            Self::GroupIndex(idx) => write!(f, "member #{idx}"),
            Self::SequenceElement(idx) => write!(f, "element {idx}"),
            Self::SequenceFree => write!(f, "free element"),
        }
    }
}

/// A sequence dimension left open by [`PathElement::SequenceFree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeDimension {
    pub stride: u64,
    pub count: Option<u64>,
}

/// A resolved route from a root layout to one of its nested layouts.
///
/// Paths borrow the root and are rebuilt on demand; they hold no state that
/// could go stale.
#[derive(Clone, Debug)]
pub struct LayoutPath<'a> {
    layout: &'a MemoryLayout,
    offset: u64,
    free: SmallVec<[FreeDimension; 2]>,
    elements: SmallVec<[PathElement; 4]>,
}

impl<'a> LayoutPath<'a> {
    pub fn root(layout: &'a MemoryLayout) -> Self {
        Self {
            layout,
            offset: 0,
            free: SmallVec::new(),
            elements: SmallVec::new(),
        }
    }

    pub fn select(&self, element: &PathElement) -> Result<Self, LayoutError> {
        match element {
            PathElement::GroupElement(name) => self.group_element(name),
            PathElement::GroupIndex(idx) => self.group_index(*idx),
            PathElement::SequenceElement(idx) => self.sequence_element(*idx),
            PathElement::SequenceFree => self.sequence_free(),
        }
    }

    pub fn group_element(&self, name: &str) -> Result<Self, LayoutError> {
        let element = PathElement::group(name);
        let Some(group) = self.layout.as_group() else {
            return Err(self.unsupported(&element));
        };

        let Some((idx, offset)) = group.member(name)? else {
            return Err(LayoutError::MissingMember {
                name: name.to_string(),
                layout: self.layout.to_string(),
            });
        };

        self.descend(&group.members()[idx], offset, None, element)
    }

    pub fn group_index(&self, idx: usize) -> Result<Self, LayoutError> {
        let element = PathElement::GroupIndex(idx);
        let Some(group) = self.layout.as_group() else {
            return Err(self.unsupported(&element));
        };

        if idx >= group.members().len() {
            return Err(LayoutError::IndexOutOfBounds {
                index: idx as u64,
                count: group.members().len() as u64,
            });
        }

        let offset = group.member_offset(idx)?;
        self.descend(&group.members()[idx], offset, None, element)
    }

    pub fn sequence_element(&self, index: u64) -> Result<Self, LayoutError> {
        let element = PathElement::SequenceElement(index);
        let Some(seq) = self.layout.as_sequence() else {
            return Err(self.unsupported(&element));
        };

        if let Some(count) = seq.count() {
            if index >= count {
                return Err(LayoutError::IndexOutOfBounds { index, count });
            }
        }

        let offset = seq
            .element()
            .byte_size()?
            .checked_mul(index)
            .ok_or(LayoutError::SizeOverflow)?;
        self.descend(seq.element(), offset, None, element)
    }

    pub fn sequence_free(&self) -> Result<Self, LayoutError> {
        let element = PathElement::SequenceFree;
        let Some(seq) = self.layout.as_sequence() else {
            return Err(self.unsupported(&element));
        };

        let dim = FreeDimension {
            stride: seq.element().byte_size()?,
            count: seq.count(),
        };
        self.descend(seq.element(), 0, Some(dim), element)
    }

    fn descend(
        &self,
        child: &'a MemoryLayout,
        rel_offset: u64,
        free: Option<FreeDimension>,
        element: PathElement,
    ) -> Result<Self, LayoutError> {
        let outer = self.layout.byte_alignment();
        let inner = child.byte_alignment();
        if inner > outer {
            return Err(LayoutError::AlignmentExceedsEnclosing {
                layout: child.to_string(),
                inner,
                outer,
            });
        }

        let offset = self
            .offset
            .checked_add(rel_offset)
            .ok_or(LayoutError::SizeOverflow)?;
        if offset % inner != 0 {
            return Err(LayoutError::Misaligned {
                layout: child.to_string(),
                offset,
                align: inner,
            });
        }

        let mut path = Self {
            layout: child,
            offset,
            free: self.free.clone(),
            elements: self.elements.clone(),
        };
        if let Some(dim) = free {
            // Every element reached through the free dimension must be aligned,
            // not only the first one.
            if dim.stride % inner != 0 {
                return Err(LayoutError::Misaligned {
                    layout: child.to_string(),
                    offset: offset + dim.stride,
                    align: inner,
                });
            }
            path.free.push(dim);
        }
        path.elements.push(element);
        Ok(path)
    }

    fn unsupported(&self, element: &PathElement) -> LayoutError {
        LayoutError::UnsupportedPath {
            element: element.to_string(),
            layout: self.layout.to_string(),
        }
    }

    /// The layout selected by this path.
    pub fn layout(&self) -> &'a MemoryLayout {
        self.layout
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn free_dimensions(&self) -> &[FreeDimension] {
        &self.free
    }

    /// Offset of the selected layout from the start of the root.
    pub fn byte_offset(&self) -> Result<u64, LayoutError> {
        if !self.free.is_empty() {
            return Err(LayoutError::FreeDimensionMismatch {
                expected: self.free.len(),
                found: 0,
            });
        }
        Ok(self.offset)
    }

    /// Offset of the selected layout once every free dimension is bound to
    /// one of `indices`, in path order.
    pub fn offset_for(&self, indices: &[u64]) -> Result<u64, LayoutError> {
        if indices.len() != self.free.len() {
            return Err(LayoutError::FreeDimensionMismatch {
                expected: self.free.len(),
                found: indices.len(),
            });
        }

        let mut offset = self.offset;
        for (dim, &index) in self.free.iter().zip(indices) {
            if let Some(count) = dim.count {
                if index >= count {
                    return Err(LayoutError::IndexOutOfBounds { index, count });
                }
            }
            offset = dim
                .stride
                .checked_mul(index)
                .and_then(|delta| offset.checked_add(delta))
                .ok_or(LayoutError::SizeOverflow)?;
        }
        Ok(offset)
    }
}

impl MemoryLayout {
    pub fn element_path(&self, elements: &[PathElement]) -> Result<LayoutPath<'_>, LayoutError> {
        elements
            .iter()
            .try_fold(LayoutPath::root(self), |path, element| path.select(element))
    }

    pub fn byte_offset_of(&self, elements: &[PathElement]) -> Result<u64, LayoutError> {
        self.element_path(elements)?.byte_offset()
    }

    pub fn select(&self, elements: &[PathElement]) -> Result<&MemoryLayout, LayoutError> {
        Ok(self.element_path(elements)?.layout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueLayout;

    fn point() -> MemoryLayout {
        MemoryLayout::struct_of([
            ValueLayout::I32.with_name("x"),
            ValueLayout::I32.with_name("y"),
        ])
    }

    #[test]
    fn struct_member_offsets() {
        let rect = MemoryLayout::struct_of([
            point().with_name("min"),
            point().with_name("max"),
        ]);

        let offset = rect
            .byte_offset_of(&[PathElement::group("max"), PathElement::group("y")])
            .unwrap();
        assert_eq!(offset, 12);

        let selected = rect
            .select(&[PathElement::group("min"), PathElement::GroupIndex(1)])
            .unwrap();
        assert_eq!(selected, &MemoryLayout::from(ValueLayout::I32.with_name("y")));
    }

    #[test]
    fn union_members_overlap() {
        let u = MemoryLayout::union_of([
            MemoryLayout::from(ValueLayout::I64.with_name("wide")),
            ValueLayout::I8.with_name("narrow").into(),
        ]);
        assert_eq!(u.byte_offset_of(&[PathElement::group("narrow")]), Ok(0));
    }

    #[test]
    fn sequence_paths() {
        let points = MemoryLayout::sequence_of(4, point());
        assert_eq!(
            points.byte_offset_of(&[PathElement::sequence(3), PathElement::group("x")]),
            Ok(24)
        );
        assert_eq!(
            points.byte_offset_of(&[PathElement::sequence(4)]),
            Err(LayoutError::IndexOutOfBounds { index: 4, count: 4 })
        );
    }

    #[test]
    fn wrong_selector_kind_is_unsupported() {
        let points = MemoryLayout::sequence_of(4, point());
        let err = points
            .element_path(&[PathElement::group("x")])
            .unwrap_err();
        assert!(err.is_unsupported());

        let err = point()
            .element_path(&[PathElement::sequence(0)])
            .unwrap_err();
        assert!(err.is_unsupported());

        let err = MemoryLayout::from(ValueLayout::I8)
            .element_path(&[PathElement::GroupIndex(0)])
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn missing_member_is_not_unsupported() {
        let err = point().element_path(&[PathElement::group("z")]).unwrap_err();
        assert!(matches!(err, LayoutError::MissingMember { .. }));
        assert!(!err.is_unsupported());
    }

    #[test]
    fn misaligned_member_is_rejected() {
        let s = MemoryLayout::struct_of([
            MemoryLayout::from(ValueLayout::I8.with_name("tag")),
            ValueLayout::I32.with_name("value").into(),
        ]);
        let err = s.element_path(&[PathElement::group("value")]).unwrap_err();
        assert_eq!(
            err,
            LayoutError::Misaligned {
                layout: ValueLayout::I32.with_name("value").to_string(),
                offset: 1,
                align: 4,
            }
        );
        assert!(s.element_path(&[PathElement::group("tag")]).is_ok());
    }

    #[test]
    fn member_alignment_cannot_exceed_enclosing() {
        let packed = MemoryLayout::struct_of([
            ValueLayout::I32.with_name("a"),
            ValueLayout::I32.with_name("b"),
        ])
        .with_byte_alignment(2)
        .unwrap();

        let err = packed.element_path(&[PathElement::group("a")]).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::AlignmentExceedsEnclosing {
                inner: 4,
                outer: 2,
                ..
            }
        ));
    }

    #[test]
    fn free_dimensions() {
        let grid = MemoryLayout::sequence_of(3, MemoryLayout::sequence_of(5, ValueLayout::I16));
        let path = grid
            .element_path(&[PathElement::SequenceFree, PathElement::SequenceFree])
            .unwrap();
        assert_eq!(path.free_dimensions().len(), 2);
        assert_eq!(path.offset_for(&[2, 4]), Ok(2 * 10 + 4 * 2));
        assert_eq!(
            path.offset_for(&[3, 0]),
            Err(LayoutError::IndexOutOfBounds { index: 3, count: 3 })
        );
        assert_eq!(
            path.byte_offset(),
            Err(LayoutError::FreeDimensionMismatch {
                expected: 2,
                found: 0
            })
        );
    }

    #[test]
    fn free_dimension_with_odd_stride() {
        let odd = MemoryLayout::struct_of([
            MemoryLayout::from(ValueLayout::I16.with_name("a")),
            MemoryLayout::padding(1),
        ]);
        let seq = MemoryLayout::sequence_of(2, odd);
        assert!(matches!(
            seq.element_path(&[PathElement::SequenceFree]),
            Err(LayoutError::Misaligned { .. })
        ));
    }
}
