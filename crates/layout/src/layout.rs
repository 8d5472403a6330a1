//! Aggregate and padding layouts.
use std::fmt;

use crate::{LayoutError, ValueLayout};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemoryLayout {
    Value(ValueLayout),
    Group(GroupLayout),
    Sequence(SequenceLayout),
    Padding(PaddingLayout),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GroupKind {
    Struct,
    Union,
}

/// A struct or union. Struct members are laid out back to back; no padding is
/// inserted implicitly, it has to be spelled out with [`PaddingLayout`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupLayout {
    kind: GroupKind,
    members: Vec<MemoryLayout>,
    align: Option<u64>,
    name: Option<Box<str>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SequenceLayout {
    element: Box<MemoryLayout>,
    /// `None` for a sequence of unknown length.
    count: Option<u64>,
    align: Option<u64>,
    name: Option<Box<str>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PaddingLayout {
    size: u64,
    name: Option<Box<str>>,
}

impl MemoryLayout {
    pub fn struct_of<I, L>(members: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<MemoryLayout>,
    {
        Self::group(GroupKind::Struct, members)
    }

    pub fn union_of<I, L>(members: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<MemoryLayout>,
    {
        Self::group(GroupKind::Union, members)
    }

    fn group<I, L>(kind: GroupKind, members: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<MemoryLayout>,
    {
        Self::Group(GroupLayout {
            kind,
            members: members.into_iter().map(Into::into).collect(),
            align: None,
            name: None,
        })
    }

    pub fn sequence_of(count: u64, element: impl Into<MemoryLayout>) -> Self {
        Self::Sequence(SequenceLayout {
            element: Box::new(element.into()),
            count: Some(count),
            align: None,
            name: None,
        })
    }

    pub fn unbounded_sequence_of(element: impl Into<MemoryLayout>) -> Self {
        Self::Sequence(SequenceLayout {
            element: Box::new(element.into()),
            count: None,
            align: None,
            name: None,
        })
    }

    pub fn padding(size: u64) -> Self {
        Self::Padding(PaddingLayout { size, name: None })
    }

    /// Returns the size of the layout in bytes.
    ///
    /// Fails for unbounded sequences and for aggregates containing one.
    pub fn byte_size(&self) -> Result<u64, LayoutError> {
        match self {
            Self::Value(value) => Ok(value.byte_size()),
            Self::Padding(padding) => Ok(padding.size),
            Self::Group(group) => {
                let mut size = 0u64;
                for member in &group.members {
                    let member_size = member.byte_size()?;
                    size = match group.kind {
                        GroupKind::Struct => size
                            .checked_add(member_size)
                            .ok_or(LayoutError::SizeOverflow)?,
                        GroupKind::Union => size.max(member_size),
                    };
                }
                Ok(size)
            }
            Self::Sequence(seq) => {
                let Some(count) = seq.count else {
                    return Err(LayoutError::Unsized(self.to_string()));
                };
                seq.element
                    .byte_size()?
                    .checked_mul(count)
                    .ok_or(LayoutError::SizeOverflow)
            }
        }
    }

    pub fn has_size(&self) -> bool {
        self.byte_size().is_ok()
    }

    pub fn byte_alignment(&self) -> u64 {
        match self {
            Self::Value(value) => value.byte_alignment(),
            Self::Padding(_) => 1,
            Self::Group(group) => group.align.unwrap_or_else(|| {
                group
                    .members
                    .iter()
                    .map(MemoryLayout::byte_alignment)
                    .max()
                    .unwrap_or(1)
            }),
            Self::Sequence(seq) => seq.align.unwrap_or_else(|| seq.element.byte_alignment()),
        }
    }

    pub fn with_byte_alignment(self, align: u64) -> Result<Self, LayoutError> {
        if !align.is_power_of_two() {
            return Err(LayoutError::InvalidAlignment(align));
        }

        Ok(match self {
            Self::Value(value) => Self::Value(value.with_byte_alignment(align)?),
            Self::Group(mut group) => {
                group.align = Some(align);
                Self::Group(group)
            }
            Self::Sequence(mut seq) => {
                seq.align = Some(align);
                Self::Sequence(seq)
            }
            // Padding is always byte aligned.
            Self::Padding(padding) => Self::Padding(padding),
        })
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Value(value) => value.name(),
            Self::Group(group) => group.name.as_deref(),
            Self::Sequence(seq) => seq.name.as_deref(),
            Self::Padding(padding) => padding.name.as_deref(),
        }
    }

    pub fn with_name(self, name: impl Into<Box<str>>) -> Self {
        let name: Box<str> = name.into();
        match self {
            Self::Value(value) => Self::Value(value.with_name(name)),
            Self::Group(mut group) => {
                group.name = Some(name);
                Self::Group(group)
            }
            Self::Sequence(mut seq) => {
                seq.name = Some(name);
                Self::Sequence(seq)
            }
            Self::Padding(mut padding) => {
                padding.name = Some(name);
                Self::Padding(padding)
            }
        }
    }

    /// Returns a copy of the layout with every name removed, recursively.
    ///
    /// Names never affect size, alignment or passing conventions, so two
    /// layouts that differ only in names have the same structural copy.
    pub fn without_names(&self) -> Self {
        match self {
            Self::Value(value) => Self::Value(value.clone().without_name()),
            Self::Group(group) => Self::Group(GroupLayout {
                kind: group.kind,
                members: group.members.iter().map(Self::without_names).collect(),
                align: group.align,
                name: None,
            }),
            Self::Sequence(seq) => Self::Sequence(SequenceLayout {
                element: Box::new(seq.element.without_names()),
                count: seq.count,
                align: seq.align,
                name: None,
            }),
            Self::Padding(padding) => Self::Padding(PaddingLayout {
                size: padding.size,
                name: None,
            }),
        }
    }

    pub fn as_value(&self) -> Option<&ValueLayout> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupLayout> {
        match self {
            Self::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&SequenceLayout> {
        match self {
            Self::Sequence(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    pub fn is_padding(&self) -> bool {
        matches!(self, Self::Padding(_))
    }
}

impl GroupLayout {
    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn is_union(&self) -> bool {
        self.kind == GroupKind::Union
    }

    pub fn members(&self) -> &[MemoryLayout] {
        &self.members
    }

    /// Looks up a member by name, returning its position and byte offset.
    pub fn member(&self, name: &str) -> Result<Option<(usize, u64)>, LayoutError> {
        let mut offset = 0u64;
        for (idx, member) in self.members.iter().enumerate() {
            if member.name() == Some(name) {
                return Ok(Some((idx, offset)));
            }
            if self.kind == GroupKind::Struct {
                offset = offset
                    .checked_add(member.byte_size()?)
                    .ok_or(LayoutError::SizeOverflow)?;
            }
        }
        Ok(None)
    }

    /// Byte offset of the member at `idx`.
    pub fn member_offset(&self, idx: usize) -> Result<u64, LayoutError> {
        match self.kind {
            GroupKind::Union => Ok(0),
            GroupKind::Struct => self.members[..idx].iter().try_fold(0u64, |acc, m| {
                acc.checked_add(m.byte_size()?)
                    .ok_or(LayoutError::SizeOverflow)
            }),
        }
    }
}

impl SequenceLayout {
    pub fn element(&self) -> &MemoryLayout {
        &self.element
    }

    pub fn count(&self) -> Option<u64> {
        self.count
    }
}

impl PaddingLayout {
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl From<ValueLayout> for MemoryLayout {
    fn from(value: ValueLayout) -> Self {
        Self::Value(value)
    }
}

impl fmt::Display for MemoryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => return write!(f, "{value}"),
            Self::Group(group) => {
                if let Some(align) = group.align {
                    write!(f, "{align}%")?;
                }
                let delim = match group.kind {
                    GroupKind::Struct => "",
                    GroupKind::Union => "|",
                };
                write!(f, "[")?;
                for (i, member) in group.members.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{delim}")?;
                    }
                    write!(f, "{member}")?;
                }
                write!(f, "]")?;
            }
            Self::Sequence(seq) => {
                if let Some(align) = seq.align {
                    write!(f, "{align}%")?;
                }
                match seq.count {
                    Some(count) => write!(f, "[{count}:{}]", seq.element)?,
                    None => write!(f, "[:{}]", seq.element)?,
                }
            }
            Self::Padding(padding) => write!(f, "x{}", padding.size * 8)?,
        }

        if let Some(name) = self.name() {
            write!(f, "({name})")?;
        }
        Ok(())
    }
}
