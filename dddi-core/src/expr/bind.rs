//! Expression binding.

use std::rc::Rc;

use super::{Access, BoundAccess, BoundExpr, BoundGetter, Context, Expr, Getter};

/// Bind `expr` to a context.
///
/// With [`Context::Static`] the context is captured once. With
/// [`Context::Dynamic`] every read and every write resolves the context
/// first, which is what lets one assignment be reused across array slots.
pub fn bind_expr(expr: &Expr, context: impl Into<Context>) -> BoundExpr {
    let context = context.into();

    let access = match expr.access() {
        Access::ReadOnly(get) => BoundAccess::ReadOnly(bind_getter(get, &context)),
        Access::Assignable { get, set } => {
            let set = Rc::clone(set);
            let ctx = context.clone();
            BoundAccess::Assignable {
                get: bind_getter(get, &context),
                set: Rc::new(move |value| set(&ctx.resolve(), value)),
            }
        }
    };

    BoundExpr::new(Rc::from(expr.text()), access)
}

fn bind_getter(get: &Getter, context: &Context) -> BoundGetter {
    let get = Rc::clone(get);
    match context.clone() {
        Context::Static(value) => Rc::new(move || get(&value)),
        Context::Dynamic(resolve) => Rc::new(move || get(&resolve())),
    }
}
