mod helpers;
mod plan;
mod recipe;
mod shopping;
mod transfer;

pub(crate) use plan::{cmd_plan_assign, cmd_plan_show, cmd_plan_unassign};
pub(crate) use recipe::{
    cmd_recipe_add, cmd_recipe_delete, cmd_recipe_edit, cmd_recipe_import, cmd_recipe_list,
    cmd_recipe_show,
};
pub(crate) use shopping::cmd_shopping;
pub(crate) use transfer::{cmd_export, cmd_import};
