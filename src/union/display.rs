use crate::union::types::{Node, Tree};

/// Render the union as an indented listing, one entry per line:
/// `name  inode  mode  size  origin`. Merged directories show `(merged)` as
/// their origin.
pub fn format_tree(tree: &Tree) -> String {
    let mut result = String::new();
    let mut stack = vec![(tree.root_inode(), 0usize)];

    while let Some((ino, depth)) = stack.pop() {
        let Some(node) = tree.get(ino) else {
            continue;
        };
        result.push_str(&format_line(node, depth, ino == tree.root_inode()));
        result.push('\n');

        for child in tree.child_inodes(ino).iter().rev() {
            stack.push((*child, depth + 1));
        }
    }
    result
}

fn format_line(node: &Node, depth: usize, is_root: bool) -> String {
    let mut name = if is_root {
        "/".to_string()
    } else {
        node.name.to_string_lossy().into_owned()
    };
    if node.is_dir() && !is_root {
        name.push('/');
    }

    let origin = match &node.real_path {
        Some(path) => path.display().to_string(),
        None => "(merged)".to_string(),
    };

    format!(
        "{}{}  {}  {:o}  {}  {}",
        "  ".repeat(depth),
        name,
        node.inode,
        node.mode,
        node.size,
        origin
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::union::builder::BuildOptions;
    use crate::union::merge::UnionTree;
    use std::fs;

    #[test]
    fn test_format_tree_nests_children() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        fs::create_dir(a.path().join("d")).unwrap();
        fs::write(a.path().join("d/p.txt"), "p").unwrap();
        fs::create_dir(b.path().join("d")).unwrap();
        fs::write(b.path().join("top.txt"), "top").unwrap();

        let union =
            UnionTree::from_roots(&[a.path(), b.path()], BuildOptions::default()).unwrap();
        let out = format_tree(&union.read());
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("/  1  "));
        assert!(lines[1].starts_with("d/  "));
        assert!(lines[1].ends_with("(merged)"));
        assert!(lines[2].starts_with("  p.txt  "));
        assert!(lines[3].starts_with("top.txt  "));
        assert!(lines[3].contains("  3  "));
    }
}
