use super::{Mod, ResourceRef};
use std::ops::ControlFlow;

impl Mod {
    /// Calls `visitor` for every resource of the mod, grouped by type and sorted by name within a type
    ///
    /// Types are visited in this order: queries, controls, benchmarks, dashboards, containers, cards,
    /// charts, counters, hierarchies, images, inputs, tables, texts, variables, locals.
    /// Returning [ControlFlow::Break] stops the walk.
    pub fn walk_resources<'a, F>(&'a self, mut visitor: F) -> ControlFlow<()>
    where
        F: FnMut(ResourceRef<'a>) -> ControlFlow<()>,
    {
        self.queries
            .values()
            .try_for_each(|r| visitor(ResourceRef::Query(r)))?;
        self.controls
            .values()
            .try_for_each(|r| visitor(ResourceRef::Control(r)))?;
        self.benchmarks
            .values()
            .try_for_each(|r| visitor(ResourceRef::Benchmark(r)))?;
        self.dashboards
            .values()
            .chain(self.containers.values())
            .try_for_each(|r| visitor(ResourceRef::Dashboard(r)))?;
        self.cards
            .values()
            .chain(self.charts.values())
            .chain(self.counters.values())
            .chain(self.hierarchies.values())
            .chain(self.images.values())
            .chain(self.inputs.values())
            .chain(self.tables.values())
            .chain(self.texts.values())
            .try_for_each(|r| visitor(ResourceRef::Leaf(r)))?;
        self.variables
            .values()
            .try_for_each(|r| visitor(ResourceRef::Variable(r)))?;
        self.locals
            .values()
            .try_for_each(|r| visitor(ResourceRef::Local(r)))
    }

    pub fn resource_count(&self) -> usize {
        let mut count = 0;
        let _ = self.walk_resources(|_| {
            count += 1;
            ControlFlow::Continue(())
        });
        count
    }
}

#[cfg(test)]
mod test {
    use crate::diagnostics::SourceRange;
    use crate::modconfig::*;
    use pretty_assertions::assert_eq;
    use std::ops::ControlFlow;

    fn sample() -> Mod {
        let range = SourceRange::default;
        let mut m = Mod::new("m", "/m", range());
        m.add_resource(Resource::Local(Local::new("m", "l", hcl::Value::Null, range())))
            .unwrap();
        m.add_resource(Resource::Leaf(DashboardLeaf::new(LeafKind::Text, "m", "t", range())))
            .unwrap();
        m.add_resource(Resource::Leaf(DashboardLeaf::new(LeafKind::Card, "m", "c", range())))
            .unwrap();
        m.add_resource(Resource::Control(Control::new("m", "c", range())))
            .unwrap();
        m.add_resource(Resource::Query(Query::new("m", "b", range())))
            .unwrap();
        m.add_resource(Resource::Query(Query::new("m", "a", range())))
            .unwrap();
        m
    }

    #[test]
    fn walk_in_type_order() {
        let m = sample();
        let mut names = vec![];
        let flow = m.walk_resources(|r| {
            names.push(r.name());
            ControlFlow::Continue(())
        });

        assert!(flow.is_continue());
        assert_eq!(
            names,
            vec![
                "m.query.a",
                "m.query.b",
                "m.control.c",
                "m.card.c",
                "m.text.t",
                "m.local.l"
            ]
        );
    }

    #[test]
    fn break_stops_the_walk() {
        let m = sample();
        let mut count = 0;
        let flow = m.walk_resources(|r| {
            count += 1;
            if r.block_type() == BlockType::Control {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        assert!(flow.is_break());
        assert_eq!(count, 3);
        assert_eq!(m.resource_count(), 6);
    }
}
