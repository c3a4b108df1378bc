//! Symbolic layer-potential operators and their binding to meshes.
//!
//! An operator is described as a small expression tree over single and
//! double layer potentials with named densities and coefficients. The
//! [`OperatorBinder`] resolves a (space, boundary tag) pair on each side
//! to a [`Bridge`], caching bridges per pair, and produces a
//! [`BoundOperator`] that can be called repeatedly with different
//! substitutions for the names.

use crate::bimesh::BoundaryTag;
use crate::bridge::{Bridge, BridgeParams};
use crate::context::ComputeContext;
use crate::discretization::{PotentialKind, QbxOptions};
use crate::function::{Function, FunctionSpace};
use crate::kernels::KernelScalar;
use crate::types::{BridgeError, BridgeResult, Direction, RealScalar};
use rlst::{MatrixInverse, RlstScalar};
use std::collections::HashMap;
use std::rc::Rc;

/// A scalar coefficient, fixed or bound by name at call time.
#[derive(Debug, Clone)]
pub enum Coefficient<T> {
    /// A fixed value.
    Const(T),
    /// Resolved from the substitutions at call time.
    Var(String),
}

/// The density a layer potential integrates.
#[derive(Debug, Clone)]
pub enum DensityExpr {
    /// A named scalar field.
    Var(String),
    /// A named vector field dotted with the source normal.
    NormalDot(String),
}

/// The kernel of a layer potential.
#[derive(Debug, Clone)]
pub enum KernelType<T> {
    /// Laplace kernel.
    Laplace,
    /// Helmholtz kernel with a wavenumber coefficient.
    Helmholtz {
        /// The wavenumber; its real part is used.
        wavenumber: Coefficient<T>,
    },
}

/// A layer-potential expression.
#[derive(Debug, Clone)]
pub enum LayerPotentialExpr<T> {
    /// Single layer potential of a density.
    SingleLayer {
        /// Kernel to integrate.
        kernel: KernelType<T>,
        /// Density to integrate.
        density: DensityExpr,
    },
    /// Double layer potential of a density.
    DoubleLayer {
        /// Kernel to integrate.
        kernel: KernelType<T>,
        /// Density to integrate.
        density: DensityExpr,
    },
    /// Target gradient of a layer potential.
    Grad(Box<LayerPotentialExpr<T>>),
    /// A scaled expression.
    Scale(Coefficient<T>, Box<LayerPotentialExpr<T>>),
    /// The sum of two expressions of the same shape.
    Sum(Box<LayerPotentialExpr<T>>, Box<LayerPotentialExpr<T>>),
}

impl<T> LayerPotentialExpr<T> {
    /// Single layer potential of the named density.
    pub fn single_layer(kernel: KernelType<T>, density: DensityExpr) -> Self {
        Self::SingleLayer { kernel, density }
    }

    /// Double layer potential of the named density.
    pub fn double_layer(kernel: KernelType<T>, density: DensityExpr) -> Self {
        Self::DoubleLayer { kernel, density }
    }

    /// Target gradient of this expression.
    pub fn grad(self) -> Self {
        Self::Grad(Box::new(self))
    }

    /// This expression scaled by a coefficient.
    pub fn scale(self, coefficient: Coefficient<T>) -> Self {
        Self::Scale(coefficient, Box::new(self))
    }

    /// The sum of this and another expression.
    pub fn sum(self, other: Self) -> Self {
        Self::Sum(Box::new(self), Box::new(other))
    }
}

/// A value bound to a name at call time.
pub enum BoundValue<'f, T: RlstScalar>
where
    T::Real: RealScalar,
{
    /// A scalar value.
    Scalar(T),
    /// A finite element function.
    Field(&'f Function<'f, T>),
}

/// Substitutions for the names of an expression.
pub type Substitutions<'f, T> = HashMap<String, BoundValue<'f, T>>;

/// Binds expressions to (space, boundary tag) pairs.
pub struct OperatorBinder<'a, T: KernelScalar>
where
    T::Real: RealScalar + MatrixInverse,
{
    ctx: &'a ComputeContext,
    qbx: QbxOptions,
    cache: HashMap<(usize, Option<BoundaryTag>), Rc<Bridge<'a, T>>>,
}

impl<'a, T: KernelScalar> OperatorBinder<'a, T>
where
    T::Real: RealScalar + MatrixInverse,
{
    /// Create a binder with default expansion orders.
    pub fn new(ctx: &'a ComputeContext) -> Self {
        Self::with_options(ctx, QbxOptions::default())
    }

    /// Create a binder with expansion orders for the bridges it builds.
    pub fn with_options(ctx: &'a ComputeContext, qbx: QbxOptions) -> Self {
        Self {
            ctx,
            qbx,
            cache: HashMap::new(),
        }
    }

    fn bridge_for(
        &mut self,
        space: &'a FunctionSpace<'a, T>,
        tag: Option<BoundaryTag>,
    ) -> BridgeResult<Rc<Bridge<'a, T>>> {
        let key = (space as *const FunctionSpace<'a, T> as usize, tag);
        if let Some(bridge) = self.cache.get(&key) {
            return Ok(Rc::clone(bridge));
        }
        let bridge = Rc::new(Bridge::new(
            self.ctx,
            space,
            BridgeParams {
                boundary_id: tag,
                qbx: self.qbx,
                ..Default::default()
            },
        )?);
        self.cache.insert(key, Rc::clone(&bridge));
        Ok(bridge)
    }

    /// Bind an expression between a source and a target pair.
    ///
    /// Densities are drawn from functions on the source space and the
    /// result is written to functions on the target space. The source
    /// must resolve to a codimension one geometry.
    pub fn bind(
        &mut self,
        expr: LayerPotentialExpr<T>,
        source: (&'a FunctionSpace<'a, T>, Option<BoundaryTag>),
        target: (&'a FunctionSpace<'a, T>, Option<BoundaryTag>),
    ) -> BridgeResult<BoundOperator<'a, T>> {
        let source_bridge = self.bridge_for(source.0, source.1)?;
        let target_bridge = self.bridge_for(target.0, target.1)?;
        if source_bridge.source().discretization().codim() != 1 {
            return Err(BridgeError::Binding(
                "The source geometry cannot support layer potentials".to_string(),
            ));
        }
        Ok(BoundOperator {
            ctx: self.ctx,
            expr,
            source: source_bridge,
            target: target_bridge,
        })
    }
}

enum Output<T> {
    Scalar(Vec<T>),
    Vector(Vec<T>, usize),
}

/// An expression bound to a source and a target geometry.
pub struct BoundOperator<'a, T: KernelScalar>
where
    T::Real: RealScalar + MatrixInverse,
{
    ctx: &'a ComputeContext,
    expr: LayerPotentialExpr<T>,
    source: Rc<Bridge<'a, T>>,
    target: Rc<Bridge<'a, T>>,
}

impl<'a, T: KernelScalar> BoundOperator<'a, T>
where
    T::Real: RealScalar + MatrixInverse,
{
    /// The bridge serving the densities.
    pub fn source_bridge(&self) -> &Bridge<'a, T> {
        &self.source
    }

    /// The bridge the result is marshalled back through.
    pub fn target_bridge(&self) -> &Bridge<'a, T> {
        &self.target
    }

    fn resolve_coefficient(
        &self,
        coefficient: &Coefficient<T>,
        subs: &Substitutions<T>,
    ) -> BridgeResult<T> {
        match coefficient {
            Coefficient::Const(value) => Ok(*value),
            Coefficient::Var(name) => match subs.get(name) {
                Some(BoundValue::Scalar(value)) => Ok(*value),
                Some(BoundValue::Field(_)) => Err(BridgeError::Binding(format!(
                    "'{name}' is bound to a field but used as a scalar"
                ))),
                None => Err(BridgeError::Binding(format!("'{name}' is not bound"))),
            },
        }
    }

    fn resolve_field<'s>(
        &self,
        name: &str,
        subs: &'s Substitutions<T>,
    ) -> BridgeResult<&'s Function<'s, T>> {
        match subs.get(name) {
            Some(BoundValue::Field(f)) => Ok(f),
            Some(BoundValue::Scalar(_)) => Err(BridgeError::Binding(format!(
                "'{name}' is bound to a scalar but used as a density"
            ))),
            None => Err(BridgeError::Binding(format!("'{name}' is not bound"))),
        }
    }

    /// Marshal a density onto the source nodes.
    fn resolve_density(
        &self,
        density: &DensityExpr,
        subs: &Substitutions<T>,
    ) -> BridgeResult<Vec<T>> {
        let space = self.source.space();
        match density {
            DensityExpr::Var(name) => {
                let f = self.resolve_field(name, subs)?;
                if !std::ptr::eq(f.space(), space) {
                    return Err(BridgeError::Binding(format!(
                        "'{name}' does not live on the bound source space"
                    )));
                }
                if f.space().value_size() != 1 {
                    return Err(BridgeError::Binding(format!(
                        "'{name}' must be a scalar density"
                    )));
                }
                self.source.apply(Direction::Forward, f.coefficients())
            }
            DensityExpr::NormalDot(name) => {
                let f = self.resolve_field(name, subs)?;
                let ambient = self
                    .source
                    .source()
                    .discretization()
                    .mesh()
                    .ambient_dim();
                if !std::ptr::eq(f.space().mesh(), space.mesh()) {
                    return Err(BridgeError::Binding(format!(
                        "'{name}' does not live on the bound source mesh"
                    )));
                }
                if f.space().value_size() != space.mesh().gdim()
                    || f.space().local_size() != space.local_size()
                {
                    return Err(BridgeError::Binding(format!(
                        "'{name}' must be a vector density matching the source space"
                    )));
                }
                let normals = self.source.source().discretization().node_normals()?;
                let mut result = vec![T::zero(); self.source.to_nnodes()];
                for comp in 0..f.space().value_size().min(ambient) {
                    let marshalled = self.source.apply(Direction::Forward, f.component(comp))?;
                    for (node, value) in marshalled.iter().enumerate() {
                        result[node] += *value * T::from_real(normals[node * ambient + comp]);
                    }
                }
                Ok(result)
            }
        }
    }

    fn build_kernel(
        &self,
        kernel: &KernelType<T>,
        subs: &Substitutions<T>,
        dim: usize,
    ) -> BridgeResult<Box<dyn crate::traits::KernelEvaluator<T = T>>> {
        match kernel {
            KernelType::Laplace => T::laplace_kernel(dim),
            KernelType::Helmholtz { wavenumber } => {
                let k = self.resolve_coefficient(wavenumber, subs)?;
                T::helmholtz_kernel(dim, k.re())
            }
        }
    }

    fn eval(
        &self,
        expr: &LayerPotentialExpr<T>,
        subs: &Substitutions<T>,
        targets: &[T::Real],
        gradient: bool,
    ) -> BridgeResult<Output<T>> {
        let ambient = self.source.source().discretization().mesh().ambient_dim();
        match expr {
            LayerPotentialExpr::SingleLayer { kernel, density }
            | LayerPotentialExpr::DoubleLayer { kernel, density } => {
                let kind = match expr {
                    LayerPotentialExpr::SingleLayer { .. } => PotentialKind::SingleLayer,
                    _ => PotentialKind::DoubleLayer,
                };
                let values = self.resolve_density(density, subs)?;
                let evaluator = self.build_kernel(kernel, subs, ambient)?;
                let result = self.source.source().evaluate(
                    self.ctx,
                    kind,
                    &values,
                    evaluator.as_ref(),
                    targets,
                    gradient,
                )?;
                if gradient {
                    Ok(Output::Vector(result, ambient))
                } else {
                    Ok(Output::Scalar(result))
                }
            }
            LayerPotentialExpr::Grad(inner) => {
                if gradient {
                    return Err(BridgeError::Binding(
                        "Nested gradients are not supported".to_string(),
                    ));
                }
                match inner.as_ref() {
                    LayerPotentialExpr::SingleLayer { .. }
                    | LayerPotentialExpr::DoubleLayer { .. } => {
                        self.eval(inner, subs, targets, true)
                    }
                    _ => Err(BridgeError::Binding(
                        "Gradients are only supported directly on layer potentials".to_string(),
                    )),
                }
            }
            LayerPotentialExpr::Scale(coefficient, inner) => {
                let scale = self.resolve_coefficient(coefficient, subs)?;
                let mut output = self.eval(inner, subs, targets, gradient)?;
                match &mut output {
                    Output::Scalar(values) | Output::Vector(values, _) => {
                        for v in values.iter_mut() {
                            *v *= scale;
                        }
                    }
                }
                Ok(output)
            }
            LayerPotentialExpr::Sum(left, right) => {
                let left = self.eval(left, subs, targets, gradient)?;
                let right = self.eval(right, subs, targets, gradient)?;
                match (left, right) {
                    (Output::Scalar(mut a), Output::Scalar(b)) if a.len() == b.len() => {
                        for (x, y) in a.iter_mut().zip(&b) {
                            *x += *y;
                        }
                        Ok(Output::Scalar(a))
                    }
                    (Output::Vector(mut a, d), Output::Vector(b, e))
                        if a.len() == b.len() && d == e =>
                    {
                        for (x, y) in a.iter_mut().zip(&b) {
                            *x += *y;
                        }
                        Ok(Output::Vector(a, d))
                    }
                    _ => Err(BridgeError::Binding(
                        "Summands have mismatched shapes".to_string(),
                    )),
                }
            }
        }
    }

    /// Evaluate the expression and write the result into a function on
    /// the target space.
    ///
    /// Densities are marshalled through the source bridge, the potential
    /// is evaluated at the target bridge's nodes and the result is
    /// marshalled back into dof order. A gradient expression needs a
    /// vector valued output function.
    pub fn call(
        &self,
        subs: &Substitutions<T>,
        output: &mut Function<'_, T>,
    ) -> BridgeResult<()> {
        let targets = self.target.source().discretization().node_coordinates();
        log::debug!(
            "Evaluating bound operator onto {} target nodes",
            self.target.to_nnodes()
        );
        let result = self.eval(&self.expr, subs, &targets, false)?;
        let target_space = self.target.space();
        if output.space().local_size() != target_space.local_size() {
            return Err(BridgeError::Shape {
                expected: target_space.local_size(),
                actual: output.space().local_size(),
            });
        }
        match result {
            Output::Scalar(values) => {
                if output.space().value_size() != 1 {
                    return Err(BridgeError::Binding(
                        "A scalar expression needs a scalar output function".to_string(),
                    ));
                }
                let coefficients = self.target.apply(Direction::Inverse, &values)?;
                output.coefficients_mut().copy_from_slice(&coefficients);
            }
            Output::Vector(values, dim) => {
                if output.space().value_size() != dim {
                    return Err(BridgeError::Binding(format!(
                        "A gradient expression needs an output function with {dim} components"
                    )));
                }
                let n = self.target.to_nnodes();
                for comp in 0..dim {
                    let coefficients = self
                        .target
                        .apply(Direction::Inverse, &values[comp * n..(comp + 1) * n])?;
                    output.component_mut(comp).copy_from_slice(&coefficients);
                }
            }
        }
        Ok(())
    }
}
