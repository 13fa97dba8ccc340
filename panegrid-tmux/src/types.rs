//! Core types for the tmux control surface
//!
//! These types map to tmux's own structures: pane handles (`%N`), the rows
//! printed by `list-panes`, and the layout tree that `select-layout` accepts.

use std::fmt::Write as _;

/// Numeric part of a `%N` pane handle
pub type TmuxPaneId = u64;

/// Parse a tmux pane handle such as `%12` (the leading `%` is optional).
pub fn parse_pane_id(handle: &str) -> Option<TmuxPaneId> {
    let handle = handle.trim();
    let digits = handle.strip_prefix('%').unwrap_or(handle);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Render a pane ID as the `%N` handle tmux expects in `-t` targets.
pub fn format_pane_id(id: TmuxPaneId) -> String {
    format!("%{}", id)
}

/// One row of `list-panes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxPane {
    pub id: TmuxPaneId,
    /// `#{pane_active}`
    pub active: bool,
    pub width: usize,
    pub height: usize,
    /// Column of the pane's left edge
    pub x: usize,
    /// Row of the pane's top edge
    pub y: usize,
    /// Directory the pane's foreground process is in
    pub current_path: String,
    /// `select-pane -T` title, which panegrid keeps equal to the slug
    pub title: String,
}

impl TmuxPane {
    /// An untitled 80x24 pane at the origin
    pub fn new(id: TmuxPaneId) -> Self {
        Self {
            id,
            active: false,
            width: 80,
            height: 24,
            x: 0,
            y: 0,
            current_path: String::new(),
            title: String::new(),
        }
    }

    /// Parse one line of `list-panes` output produced with
    /// [`crate::TmuxCommand::PANE_FORMAT`].
    ///
    /// The title is the last field so a title containing the separator
    /// survives intact.
    pub fn parse_list_line(line: &str) -> Option<Self> {
        let mut fields = line.splitn(8, '\t');
        let id = parse_pane_id(fields.next()?)?;
        let active = fields.next()? == "1";
        let width = fields.next()?.parse().ok()?;
        let height = fields.next()?.parse().ok()?;
        let x = fields.next()?.parse().ok()?;
        let y = fields.next()?.parse().ok()?;
        let current_path = fields.next()?.to_string();
        let title = fields.next().unwrap_or_default().to_string();
        Some(Self {
            id,
            active,
            width,
            height,
            x,
            y,
            current_path,
            title,
        })
    }
}

/// A window layout as `select-layout` reads it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxLayout {
    pub root: LayoutNode,
}

/// Cell of a layout tree. Every node carries its size and absolute
/// position in the window, nested cells included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutNode {
    Pane {
        id: TmuxPaneId,
        width: usize,
        height: usize,
        x: usize,
        y: usize,
    },
    /// Children stacked top to bottom, written `[...]`
    HorizontalSplit {
        width: usize,
        height: usize,
        x: usize,
        y: usize,
        children: Vec<LayoutNode>,
    },
    /// Children side by side, written `{...}`
    VerticalSplit {
        width: usize,
        height: usize,
        x: usize,
        y: usize,
        children: Vec<LayoutNode>,
    },
}

impl LayoutNode {
    /// Width of the node in characters
    pub fn width(&self) -> usize {
        match self {
            LayoutNode::Pane { width, .. }
            | LayoutNode::HorizontalSplit { width, .. }
            | LayoutNode::VerticalSplit { width, .. } => *width,
        }
    }

    /// Height of the node in characters
    pub fn height(&self) -> usize {
        match self {
            LayoutNode::Pane { height, .. }
            | LayoutNode::HorizontalSplit { height, .. }
            | LayoutNode::VerticalSplit { height, .. } => *height,
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            LayoutNode::Pane {
                id,
                width,
                height,
                x,
                y,
            } => {
                let _ = write!(out, "{}x{},{},{},{}", width, height, x, y, id);
            }
            LayoutNode::VerticalSplit {
                width,
                height,
                x,
                y,
                children,
            } => {
                let _ = write!(out, "{}x{},{},{}", width, height, x, y);
                Self::write_children(out, children, '{', '}');
            }
            LayoutNode::HorizontalSplit {
                width,
                height,
                x,
                y,
                children,
            } => {
                let _ = write!(out, "{}x{},{},{}", width, height, x, y);
                Self::write_children(out, children, '[', ']');
            }
        }
    }

    fn write_children(out: &mut String, children: &[LayoutNode], open: char, close: char) {
        out.push(open);
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            child.write_to(out);
        }
        out.push(close);
    }
}

/// Compute tmux's layout checksum over a layout body (without the prefix).
///
/// Each byte is added to an accumulator that is first rotated right by one
/// bit; the result is kept to 16 bits.
pub fn layout_checksum(layout: &str) -> u16 {
    layout.bytes().fold(0u16, |csum, byte| {
        let rotated = (csum >> 1) | ((csum & 1) << 15);
        rotated.wrapping_add(u16::from(byte))
    })
}

/// Byte cursor over a layout body
struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn eat(&mut self, c: char) -> bool {
        match self.rest.strip_prefix(c) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn expect(&mut self, c: char) -> Option<()> {
        self.eat(c).then_some(())
    }

    fn number(&mut self) -> Option<usize> {
        let len = self
            .rest
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if len == 0 {
            return None;
        }
        let (digits, rest) = self.rest.split_at(len);
        self.rest = rest;
        digits.parse().ok()
    }

    /// `WxH,X,Y` followed by `,ID`, `{cells}` or `[cells]`
    fn node(&mut self) -> Option<LayoutNode> {
        let width = self.number()?;
        self.expect('x')?;
        let height = self.number()?;
        self.expect(',')?;
        let x = self.number()?;
        self.expect(',')?;
        let y = self.number()?;

        if self.eat('{') {
            let children = self.cells('}')?;
            Some(LayoutNode::VerticalSplit {
                width,
                height,
                x,
                y,
                children,
            })
        } else if self.eat('[') {
            let children = self.cells(']')?;
            Some(LayoutNode::HorizontalSplit {
                width,
                height,
                x,
                y,
                children,
            })
        } else {
            self.expect(',')?;
            let id = self.number()? as TmuxPaneId;
            Some(LayoutNode::Pane {
                id,
                width,
                height,
                x,
                y,
            })
        }
    }

    fn cells(&mut self, close: char) -> Option<Vec<LayoutNode>> {
        let mut cells = vec![self.node()?];
        while !self.eat(close) {
            self.expect(',')?;
            cells.push(self.node()?);
        }
        Some(cells)
    }
}

impl TmuxLayout {
    /// Parse a layout descriptor such as
    /// `b25f,80x24,0,0{40x24,0,0,1,39x24,41,0,2}`.
    ///
    /// A leading 4-hex-digit checksum is accepted but not checked; use
    /// [`Self::verify_checksum`] for that. Returns `None` on any syntax
    /// error or trailing input.
    pub fn parse(descriptor: &str) -> Option<Self> {
        let (_, body) = Self::split_checksum(descriptor.trim());
        let mut cursor = Cursor { rest: body };
        let root = cursor.node()?;
        cursor.rest.is_empty().then_some(Self { root })
    }

    fn split_checksum(descriptor: &str) -> (Option<&str>, &str) {
        match descriptor.split_once(',') {
            Some((prefix, body))
                if prefix.len() == 4 && prefix.bytes().all(|b| b.is_ascii_hexdigit()) =>
            {
                (Some(prefix), body)
            }
            _ => (None, descriptor),
        }
    }

    /// Whether `descriptor` starts with the checksum of its own body
    pub fn verify_checksum(descriptor: &str) -> bool {
        match Self::split_checksum(descriptor.trim()) {
            (Some(prefix), body) => format!("{:04x}", layout_checksum(body)) == prefix,
            (None, _) => false,
        }
    }

    /// Render the tree with its checksum prefix
    pub fn to_layout_string(&self) -> String {
        let mut body = String::new();
        self.root.write_to(&mut body);
        format!("{:04x},{}", layout_checksum(&body), body)
    }

    /// Pane IDs in left-to-right, top-to-bottom tree order
    pub fn pane_ids(&self) -> Vec<TmuxPaneId> {
        fn walk(node: &LayoutNode, out: &mut Vec<TmuxPaneId>) {
            match node {
                LayoutNode::Pane { id, .. } => out.push(*id),
                LayoutNode::HorizontalSplit { children, .. }
                | LayoutNode::VerticalSplit { children, .. } => {
                    children.iter().for_each(|child| walk(child, out))
                }
            }
        }
        let mut ids = Vec::new();
        walk(&self.root, &mut ids);
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pane_id() {
        assert_eq!(parse_pane_id("%12"), Some(12));
        assert_eq!(parse_pane_id("7"), Some(7));
        assert_eq!(parse_pane_id(" %3 "), Some(3));
        assert_eq!(parse_pane_id("%"), None);
        assert_eq!(parse_pane_id("@1"), None);
        assert_eq!(format_pane_id(4), "%4");
    }

    #[test]
    fn test_parse_list_line() {
        let pane =
            TmuxPane::parse_list_line("%5\t1\t80\t24\t41\t0\t/repo/wt/x\tx\twith tab").unwrap();
        assert_eq!(pane.id, 5);
        assert!(pane.active);
        assert_eq!((pane.width, pane.height, pane.x, pane.y), (80, 24, 41, 0));
        assert_eq!(pane.current_path, "/repo/wt/x");
        assert_eq!(pane.title, "x\twith tab");

        assert!(TmuxPane::parse_list_line("garbage").is_none());
    }

    #[test]
    fn test_parse_leaf() {
        let layout = TmuxLayout::parse("120x40,3,2,9").unwrap();
        assert_eq!(
            layout.root,
            LayoutNode::Pane {
                id: 9,
                width: 120,
                height: 40,
                x: 3,
                y: 2,
            }
        );
    }

    #[test]
    fn test_parse_skips_checksum_prefix() {
        let layout = TmuxLayout::parse("1f2e,120x40,0,0,9").unwrap();
        assert_eq!(layout.pane_ids(), vec![9]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(TmuxLayout::parse("").is_none());
        assert!(TmuxLayout::parse("120x40,0,0,9]").is_none());
        assert!(TmuxLayout::parse("120x40,0,0{60x40,0,0,1").is_none());
        assert!(TmuxLayout::parse("120x40,0,0{}").is_none());
        assert!(TmuxLayout::parse("120x40,0,0").is_none());
    }

    #[test]
    fn test_parse_grid_of_columns_and_rows() {
        let layout = TmuxLayout::parse(
            "121x30,0,0{40x30,0,0,0,80x30,41,0[80x15,41,0,1,80x14,41,16{40x14,41,16,2,39x14,82,16,3}]}",
        )
        .unwrap();
        let LayoutNode::VerticalSplit { children, .. } = &layout.root else {
            panic!("root should be side by side");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(
            &children[1],
            LayoutNode::HorizontalSplit { children, .. } if children.len() == 2
        ));
        assert_eq!(layout.pane_ids(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_checksum_known_values() {
        assert_eq!(layout_checksum(""), 0);
        assert_eq!(layout_checksum("a"), 0x0061);
        // Low bit of 0x61 rotates into bit 15 before the second byte is added.
        assert_eq!(layout_checksum("ab"), 0x8092);
        assert_eq!(
            layout_checksum("89x24,0,0{44x24,0,0,1,44x24,45,0,2}"),
            0xa97e
        );
    }

    #[test]
    fn test_serialize_reproduces_body() {
        let body = "121x30,0,0{40x30,0,0,0,80x30,41,0[80x15,41,0,1,80x14,41,16,2]}";
        let layout = TmuxLayout::parse(body).unwrap();
        let rendered = layout.to_layout_string();
        assert_eq!(&rendered[5..], body);
        assert!(TmuxLayout::verify_checksum(&rendered));
    }

    #[test]
    fn test_checksum_is_zero_padded() {
        let layout = TmuxLayout {
            root: LayoutNode::Pane {
                id: 0,
                width: 14,
                height: 9,
                x: 0,
                y: 0,
            },
        };
        let rendered = layout.to_layout_string();
        assert_eq!(rendered, "00de,14x9,0,0,0");
        assert!(TmuxLayout::verify_checksum(&rendered));
        assert!(!TmuxLayout::verify_checksum("de,14x9,0,0,0"));
        assert!(!TmuxLayout::verify_checksum("0000,1x1,0,0,0"));
    }
}
