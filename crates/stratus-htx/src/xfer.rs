//! Block transfer between two messages

use tracing::trace;

use crate::{BlockInfo, BlockType, Htx};

/// Move blocks from the head of `src` to the tail of `dst`.
///
/// `count` bounds the payload bytes moved; zero-size markers cost nothing.
/// DATA blocks may be split at the budget or when `dst` runs out of room.
/// A header or trailer section moves as a whole or not at all; when a
/// complete section cannot fit even into an empty `dst`, `src` is flagged
/// `PARSING_ERROR`. Returns the payload bytes moved.
pub fn xfer_blks(dst: &mut Htx<'_>, src: &mut Htx<'_>, count: usize) -> usize {
    let mut moved = 0;

    while let Some(head) = src.head_block() {
        let ty = head.block_type();
        match ty {
            BlockType::Data => {
                let budget = count - moved;
                if budget == 0 {
                    break;
                }
                let chunk = &head.payload()[..head.size().min(budget)];
                let want = chunk.len();
                let n = dst.add_data(chunk);
                src.cut_data_head(n);
                moved += n;
                if n < want {
                    break;
                }
            }
            BlockType::Unused => {
                src.remove_head();
            }
            _ => match xfer_section(dst, src, count - moved) {
                Section::Moved(n) => moved += n,
                Section::Blocked => break,
            },
        }
    }

    trace!(moved, count, left = src.data(), "htx blocks transferred");
    moved
}

enum Section {
    Moved(usize),
    Blocked,
}

/// Move the header or trailer section starting at the head of `src`
fn xfer_section(dst: &mut Htx<'_>, src: &mut Htx<'_>, budget: usize) -> Section {
    let trailers = src
        .head_block()
        .map(|b| b.block_type().is_trailer_section())
        .unwrap_or(false);
    let in_section = |ty: BlockType| {
        if trailers {
            ty.is_trailer_section()
        } else {
            ty.is_header_section()
        }
    };

    // Measure the section; it ends at its marker or at a foreign block
    let mut nblks = 0usize;
    let mut size = 0usize;
    let mut terminated = false;
    for blk in src.blocks() {
        let ty = blk.block_type();
        if !in_section(ty) {
            terminated = true;
            break;
        }
        nblks += 1;
        size += blk.size();
        if ty.is_end_marker() {
            terminated = true;
            break;
        }
    }

    // still being produced
    if !terminated || size > budget {
        return Section::Blocked;
    }

    let dst_was_empty = dst.is_empty();
    let mut copied = 0usize;
    for blk in src.blocks().take(nblks) {
        let info: BlockInfo = blk.info();
        if !dst.push_raw(info, blk.payload()) {
            break;
        }
        copied += 1;
    }

    if copied < nblks {
        for _ in 0..copied {
            dst.remove_tail();
        }
        if dst_was_empty {
            src.flags_mut().set_parsing_error(true);
        }
        return Section::Blocked;
    }

    for _ in 0..nblks {
        src.remove_head();
    }
    Section::Moved(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Buffer, StartLine, HTX_HDR_SIZE};
    use proptest::prelude::*;

    fn headers(htx: &mut Htx<'_>) {
        htx.add_stline(BlockType::ResSl, StartLine::new(b"HTTP/1.1", b"200", b"OK"))
            .unwrap();
        htx.add_header(b"content-type", b"text/plain").unwrap();
        htx.add_endof(BlockType::Eoh).unwrap();
    }

    #[test]
    fn test_data_split_at_budget() {
        let (mut a, mut b) = (Buffer::new(256), Buffer::new(256));
        let mut src = Htx::from_buf(&mut a);
        let mut dst = Htx::from_buf(&mut b);
        src.add_data(&[b'x'; 40]);

        assert_eq!(xfer_blks(&mut dst, &mut src, 10), 10);
        assert_eq!(src.data(), 30);
        assert_eq!(dst.data(), 10);
        assert_eq!(xfer_blks(&mut dst, &mut src, 100), 30);
        assert!(src.is_empty());
        assert_eq!(dst.nbblks(), 1);
        assert_eq!(dst.data(), 40);
    }

    #[test]
    fn test_markers_are_free() {
        let (mut a, mut b) = (Buffer::new(256), Buffer::new(256));
        let mut src = Htx::from_buf(&mut a);
        let mut dst = Htx::from_buf(&mut b);
        src.add_endof(BlockType::Eot).unwrap();

        assert_eq!(xfer_blks(&mut dst, &mut src, 0), 0);
        assert!(src.is_empty());
        assert_eq!(dst.head_block().unwrap().block_type(), BlockType::Eot);
    }

    #[test]
    fn test_header_section_atomic() {
        let (mut a, mut b) = (Buffer::new(256), Buffer::new(256));
        let mut src = Htx::from_buf(&mut a);
        let mut dst = Htx::from_buf(&mut b);
        headers(&mut src);
        src.add_data(b"body");
        let hdr_size = src.data() - 4;

        // budget below the section size: nothing moves, no error
        assert_eq!(xfer_blks(&mut dst, &mut src, hdr_size - 1), 0);
        assert!(dst.is_empty());
        assert!(!src.is_parsing_error());

        assert_eq!(xfer_blks(&mut dst, &mut src, hdr_size + 2), hdr_size + 2);
        assert_eq!(dst.nbblks(), 4);
        assert_eq!(src.data(), 2);
    }

    #[test]
    fn test_section_rolled_back_when_dst_full() {
        let (mut a, mut b) = (Buffer::new(256), Buffer::new(HTX_HDR_SIZE + 64));
        let mut src = Htx::from_buf(&mut a);
        let mut dst = Htx::from_buf(&mut b);
        dst.add_data(&[b'd'; 20]);
        headers(&mut src);

        assert_eq!(xfer_blks(&mut dst, &mut src, 1000), 0);
        assert_eq!(dst.nbblks(), 1);
        assert_eq!(dst.data(), 20);
        assert_eq!(src.nbblks(), 3);
        assert!(!src.is_parsing_error());
    }

    #[test]
    fn test_oversized_section_is_parsing_error() {
        let (mut a, mut b) = (Buffer::new(512), Buffer::new(HTX_HDR_SIZE + 64));
        let mut src = Htx::from_buf(&mut a);
        let mut dst = Htx::from_buf(&mut b);
        src.add_header(b"cookie", &[b'c'; 100]).unwrap();
        src.add_endof(BlockType::Eoh).unwrap();

        assert_eq!(xfer_blks(&mut dst, &mut src, 1000), 0);
        assert!(dst.is_empty());
        assert!(src.is_parsing_error());
    }

    #[test]
    fn test_unterminated_section_waits() {
        let (mut a, mut b) = (Buffer::new(256), Buffer::new(256));
        let mut src = Htx::from_buf(&mut a);
        let mut dst = Htx::from_buf(&mut b);
        src.add_header(b"a", b"1").unwrap();

        assert_eq!(xfer_blks(&mut dst, &mut src, 100), 0);
        assert_eq!(src.nbblks(), 1);
    }

    #[test]
    fn test_trailers_follow_data() {
        let (mut a, mut b) = (Buffer::new(256), Buffer::new(256));
        let mut src = Htx::from_buf(&mut a);
        let mut dst = Htx::from_buf(&mut b);
        src.add_data(b"12345");
        src.add_trailer(b"grpc-status", b"0").unwrap();
        src.add_endof(BlockType::Eot).unwrap();

        assert_eq!(xfer_blks(&mut dst, &mut src, 100), 17);
        let types: Vec<_> = dst.blocks().map(|b| b.block_type()).collect();
        assert_eq!(types, vec![BlockType::Data, BlockType::Tlr, BlockType::Eot]);
        assert!(src.is_empty());
    }

    proptest! {
        #[test]
        fn prop_data_conservation(len in 1usize..200, count in 0usize..300) {
            let (mut a, mut b) = (Buffer::new(512), Buffer::new(512));
            let mut src = Htx::from_buf(&mut a);
            let mut dst = Htx::from_buf(&mut b);
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            src.add_data(&payload);

            let moved = xfer_blks(&mut dst, &mut src, count);
            prop_assert_eq!(moved, len.min(count));
            prop_assert_eq!(src.data() + dst.data(), len);

            let mut seen: Vec<u8> = dst.blocks().flat_map(|b| b.payload().to_vec()).collect();
            seen.extend(src.blocks().flat_map(|b| b.payload().to_vec()));
            prop_assert_eq!(seen, payload);
        }
    }
}
