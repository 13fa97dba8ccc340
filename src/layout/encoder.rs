//! Layout descriptor generation
//!
//! Turns a grid shape and concrete pane IDs into the checksummed descriptor
//! that `select-layout` applies in one step. Coordinates are absolute on
//! every node, including panes nested in row containers.

use panegrid_tmux::{LayoutNode, TmuxLayout, TmuxPaneId};

/// Input to [`encode_layout`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest<'a> {
    pub sidebar_id: TmuxPaneId,
    /// Content panes in grid order, filled row by row
    pub content_pane_ids: &'a [TmuxPaneId],
    /// Filler pane appended to the final row
    pub spacer_id: Option<TmuxPaneId>,
    pub sidebar_width: usize,
    pub window_width: usize,
    pub window_height: usize,
    pub columns: usize,
    pub max_pane_width: usize,
}

/// Output of [`encode_layout`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedLayout {
    /// `xxxx,` checksum prefix followed by the layout body
    pub descriptor: String,
    /// The spacer row had no room left for the spacer; it was clamped to one
    /// column. Points at an infeasible configuration upstream.
    pub spacer_overflow: bool,
}

/// Encode the sidebar plus content grid as a tmux layout descriptor.
///
/// Same input, byte-identical output.
pub fn encode_layout(request: &EncodeRequest<'_>) -> EncodedLayout {
    let height = request.window_height;
    let content = request.content_pane_ids;

    if content.is_empty() {
        let root = LayoutNode::Pane {
            id: request.sidebar_id,
            width: request.window_width,
            height,
            x: 0,
            y: 0,
        };
        return EncodedLayout {
            descriptor: TmuxLayout { root }.to_layout_string(),
            spacer_overflow: false,
        };
    }

    let sidebar = LayoutNode::Pane {
        id: request.sidebar_id,
        width: request.sidebar_width,
        height,
        x: 0,
        y: 0,
    };
    let grid_x = request.sidebar_width + 1;
    let grid_width = request.window_width.saturating_sub(grid_x);
    let columns = request.columns.clamp(1, content.len());
    let rows: Vec<&[TmuxPaneId]> = content.chunks(columns).collect();
    let row_height = height.saturating_sub(rows.len() - 1) / rows.len();

    let mut spacer_overflow = false;
    let mut row_nodes = Vec::with_capacity(rows.len());
    let mut y = 0;
    for (index, row) in rows.iter().enumerate() {
        let last = index + 1 == rows.len();
        let row_h = if last {
            height.saturating_sub(y)
        } else {
            row_height
        };

        let cells = match request.spacer_id.filter(|_| last) {
            Some(spacer) => {
                let (cells, overflow) =
                    spacer_row_cells(row, spacer, grid_x, grid_width, request.max_pane_width);
                spacer_overflow |= overflow;
                cells
            }
            None => even_row_cells(row, grid_x, grid_width),
        };

        let mut leaves: Vec<LayoutNode> = cells
            .into_iter()
            .map(|(id, x, width)| LayoutNode::Pane {
                id,
                width,
                height: row_h,
                x,
                y,
            })
            .collect();

        row_nodes.push(if leaves.len() == 1 {
            leaves.swap_remove(0)
        } else {
            LayoutNode::VerticalSplit {
                width: grid_width,
                height: row_h,
                x: grid_x,
                y,
                children: leaves,
            }
        });
        y += row_h + 1;
    }

    let mut children = vec![sidebar];
    if row_nodes.len() == 1 {
        // A single row sits directly beside the sidebar
        match row_nodes.swap_remove(0) {
            LayoutNode::VerticalSplit {
                children: cells, ..
            } => children.extend(cells),
            leaf => children.push(leaf),
        }
    } else {
        children.push(LayoutNode::HorizontalSplit {
            width: grid_width,
            height,
            x: grid_x,
            y: 0,
            children: row_nodes,
        });
    }

    let root = LayoutNode::VerticalSplit {
        width: request.window_width,
        height,
        x: 0,
        y: 0,
        children,
    };

    EncodedLayout {
        descriptor: TmuxLayout { root }.to_layout_string(),
        spacer_overflow,
    }
}

/// Split `width` evenly; the first pane takes the remainder.
fn even_row_cells(
    row: &[TmuxPaneId],
    x0: usize,
    width: usize,
) -> Vec<(TmuxPaneId, usize, usize)> {
    let available = width.saturating_sub(row.len() - 1);
    let base = available / row.len();
    let remainder = available % row.len();

    let mut x = x0;
    let mut cells = Vec::with_capacity(row.len());
    for (i, &id) in row.iter().enumerate() {
        let w = if i == 0 { base + remainder } else { base };
        cells.push((id, x, w));
        x += w + 1;
    }
    cells
}

/// Real panes fixed at `max_width`, the spacer takes what is left.
fn spacer_row_cells(
    row: &[TmuxPaneId],
    spacer: TmuxPaneId,
    x0: usize,
    width: usize,
    max_width: usize,
) -> (Vec<(TmuxPaneId, usize, usize)>, bool) {
    let used = row.len() * (max_width + 1);
    let (spacer_width, overflow) = match width.checked_sub(used) {
        Some(rest) if rest >= 1 => (rest, false),
        _ => {
            log::warn!(
                "Spacer row overflows: {} panes at width {} need {} of {} columns",
                row.len(),
                max_width,
                used + 1,
                width
            );
            (1, true)
        }
    };

    let mut x = x0;
    let mut cells = Vec::with_capacity(row.len() + 1);
    for &id in row {
        cells.push((id, x, max_width));
        x += max_width + 1;
    }
    cells.push((spacer, x, spacer_width));
    (cells, overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content: &[TmuxPaneId]) -> EncodeRequest<'_> {
        EncodeRequest {
            sidebar_id: 0,
            content_pane_ids: content,
            spacer_id: None,
            sidebar_width: 40,
            window_width: 200,
            window_height: 50,
            columns: 2,
            max_pane_width: 80,
        }
    }

    #[test]
    fn test_single_pane_flattened_beside_sidebar() {
        let req = EncodeRequest {
            window_width: 121,
            columns: 1,
            ..request(&[1])
        };
        let encoded = encode_layout(&req);
        assert_eq!(
            encoded.descriptor,
            "76b0,121x50,0,0{40x50,0,0,0,80x50,41,0,1}"
        );
        assert!(!encoded.spacer_overflow);
    }

    #[test]
    fn test_two_by_two_grid() {
        let encoded = encode_layout(&request(&[1, 2, 3, 4]));
        assert_eq!(
            encoded.descriptor,
            "8d25,200x50,0,0{40x50,0,0,0,159x50,41,0[159x24,41,0{79x24,41,0,1,79x24,121,0,2},159x25,41,25{79x25,41,25,3,79x25,121,25,4}]}"
        );
    }

    #[test]
    fn test_remainder_goes_to_first_pane() {
        let req = EncodeRequest {
            window_width: 201,
            window_height: 40,
            columns: 3,
            ..request(&[1, 2, 3])
        };
        assert_eq!(
            encode_layout(&req).descriptor,
            "dcc7,201x40,0,0{40x40,0,0,0,54x40,41,0,1,52x40,96,0,2,52x40,149,0,3}"
        );
    }

    #[test]
    fn test_spacer_absorbs_leftover_width() {
        let req = EncodeRequest {
            spacer_id: Some(9),
            window_width: 180,
            window_height: 30,
            ..request(&[1, 2, 3])
        };
        let encoded = encode_layout(&req);
        assert_eq!(
            encoded.descriptor,
            "a4aa,180x30,0,0{40x30,0,0,0,139x30,41,0[139x14,41,0{69x14,41,0,1,69x14,111,0,2},139x15,41,15{80x15,41,15,3,58x15,122,15,9}]}"
        );
        assert!(!encoded.spacer_overflow);
    }

    #[test]
    fn test_spacer_overflow_is_flagged_and_clamped() {
        let req = EncodeRequest {
            spacer_id: Some(9),
            window_width: 100,
            ..request(&[1, 2, 3])
        };
        let encoded = encode_layout(&req);
        assert!(encoded.spacer_overflow);
        let layout = TmuxLayout::parse(&encoded.descriptor).unwrap();
        assert_eq!(layout.pane_ids(), vec![0, 1, 2, 3, 9]);
        assert!(encoded.descriptor.contains("1x25,122,25,9"));
    }

    #[test]
    fn test_sidebar_only() {
        let encoded = encode_layout(&request(&[]));
        let layout = TmuxLayout::parse(&encoded.descriptor).unwrap();
        assert_eq!(layout.pane_ids(), vec![0]);
        assert_eq!(layout.root.width(), 200);
    }

    #[test]
    fn test_checksum_prefix_matches_body() {
        for count in 1..9u64 {
            let ids: Vec<TmuxPaneId> = (1..=count).collect();
            let req = EncodeRequest {
                columns: 3,
                window_width: 300,
                window_height: 77,
                ..request(&ids)
            };
            let encoded = encode_layout(&req);
            let (prefix, _) = encoded.descriptor.split_once(',').unwrap();
            assert_eq!(prefix.len(), 4);
            assert!(prefix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            assert!(TmuxLayout::verify_checksum(&encoded.descriptor));
        }
    }

    #[test]
    fn test_deterministic_output() {
        let ids = [4, 7, 2, 9, 11];
        let req = EncodeRequest {
            columns: 3,
            spacer_id: Some(12),
            window_width: 290,
            ..request(&ids)
        };
        let first = encode_layout(&req);
        for _ in 0..5 {
            assert_eq!(encode_layout(&req), first);
        }
    }

    #[test]
    fn test_every_node_uses_absolute_coordinates() {
        let ids = [1, 2, 3, 4, 5];
        let req = EncodeRequest {
            columns: 2,
            window_height: 61,
            ..request(&ids)
        };
        let layout = TmuxLayout::parse(&encode_layout(&req).descriptor).unwrap();
        let LayoutNode::VerticalSplit { children, .. } = &layout.root else {
            panic!("root should be a side-by-side split");
        };
        let LayoutNode::HorizontalSplit { children: rows, .. } = &children[1] else {
            panic!("grid should stack rows");
        };
        // rows at y = 0, 20, 40 (heights 19, 19, 21)
        let ys: Vec<usize> = rows
            .iter()
            .map(|row| match row {
                LayoutNode::Pane { y, .. }
                | LayoutNode::VerticalSplit { y, .. }
                | LayoutNode::HorizontalSplit { y, .. } => *y,
            })
            .collect();
        assert_eq!(ys, vec![0, 20, 40]);
        assert_eq!(rows[2].height(), 21);
        assert_eq!(rows[2].width(), 159);
    }
}
