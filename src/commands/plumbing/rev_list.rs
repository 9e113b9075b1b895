use crate::areas::repository::Repository;
use crate::artifacts::log::rev_walk::Sorting;
use std::io::Write;

#[derive(Debug, Clone, Default)]
pub struct RevListOptions {
    pub topo_order: bool,
    pub date_order: bool,
    pub reverse: bool,
    pub first_parent: bool,
}

impl RevListOptions {
    fn sorting(&self) -> Sorting {
        let mut sorting = Sorting::NONE;
        if self.topo_order {
            sorting |= Sorting::TOPOLOGICAL;
        }
        if self.date_order {
            sorting |= Sorting::TOPOLOGICAL | Sorting::TIME;
        }
        if self.reverse {
            sorting |= Sorting::REVERSE;
        }
        sorting
    }
}

impl Repository {
    /// Print commits reachable from the positive revisions and not from `^rev` or the left of `a..b`
    pub fn rev_list(
        &self,
        revisions: &[String],
        options: &RevListOptions,
        writer: &mut dyn Write,
    ) -> anyhow::Result<()> {
        let mut walk = self.rev_walk();
        walk.set_sorting(options.sorting());
        if options.first_parent {
            walk.simplify_first_parent();
        }

        for revision in revisions {
            if let Some(hidden) = revision.strip_prefix('^') {
                walk.hide(&self.revparse_single(hidden)?)?;
            } else if revision.contains("..") {
                walk.push_range(revision)?;
            } else {
                walk.push(&self.revparse_single(revision)?)?;
            }
        }

        for oid in walk {
            writeln!(writer, "{}", oid?)?;
        }

        Ok(())
    }
}
