use diffsol::{
    ConstantOp, LinearOp, NonLinearOp, NonLinearOpJacobian, OdeEquations, OdeEquationsRef, Op,
};

use super::{DiffEq, M, T, V};

pub struct OdeRhs<'a> {
    nstates: usize,
    nparams: usize,
    p: &'a V,
    func: DiffEq,
}

impl Op for OdeRhs<'_> {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

impl NonLinearOp for OdeRhs<'_> {
    fn call_inplace(&self, x: &Self::V, t: Self::T, y: &mut Self::V) {
        (self.func)(x, self.p, t, y)
    }
}

impl NonLinearOpJacobian for OdeRhs<'_> {
    /// Forward-difference directional derivative of the right-hand side
    fn jac_mul_inplace(&self, x: &Self::V, t: Self::T, v: &Self::V, y: &mut Self::V) {
        let norm = v.amax();
        if norm == 0.0 {
            y.fill(0.0);
            return;
        }
        let h = f64::EPSILON.sqrt() * x.amax().max(1.0) / norm;
        let shifted = x + v * h;
        let mut base = V::zeros(self.nstates);
        (self.func)(x, self.p, t, &mut base);
        (self.func)(&shifted, self.p, t, y);
        *y -= &base;
        *y /= h;
    }
}

pub struct OdeMass {
    nstates: usize,
    nparams: usize,
}

impl Op for OdeMass {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

impl LinearOp for OdeMass {
    fn gemv_inplace(&self, _x: &Self::V, _t: Self::T, _beta: Self::T, _y: &mut Self::V) {}
}

pub struct OdeInit {
    nstates: usize,
    nparams: usize,
    init: V,
}

impl Op for OdeInit {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

impl ConstantOp for OdeInit {
    fn call_inplace(&self, _t: Self::T, y: &mut Self::V) {
        y.copy_from(&self.init);
    }
}

/// Placeholder for the root and output functions, neither is used
pub struct OdeUnused {
    nstates: usize,
    nparams: usize,
}

impl Op for OdeUnused {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        0
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

impl NonLinearOp for OdeUnused {
    fn call_inplace(&self, _x: &Self::V, _t: Self::T, _y: &mut Self::V) {}
}

/// An explicit ODE `dx/dt = f(x, p, t)` with a fixed initial state
pub struct OdeProblem {
    func: DiffEq,
    nstates: usize,
    p: V,
    init: V,
}

impl OdeProblem {
    pub fn new(func: DiffEq, p: V, init: V) -> Self {
        Self {
            func,
            nstates: init.len(),
            p,
            init,
        }
    }
}

impl Op for OdeProblem {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.p.len()
    }
}

impl<'b> OdeEquationsRef<'b> for OdeProblem {
    type Rhs = OdeRhs<'b>;
    type Mass = OdeMass;
    type Init = OdeInit;
    type Root = OdeUnused;
    type Out = OdeUnused;
}

impl OdeEquations for OdeProblem {
    fn rhs(&self) -> OdeRhs<'_> {
        OdeRhs {
            nstates: self.nstates,
            nparams: self.p.len(),
            p: &self.p,
            func: self.func,
        }
    }

    fn mass(&self) -> Option<OdeMass> {
        None
    }

    fn init(&self) -> OdeInit {
        OdeInit {
            nstates: self.nstates,
            nparams: self.p.len(),
            init: self.init.clone(),
        }
    }

    fn get_params(&self, p: &mut V) {
        p.copy_from(&self.p);
    }

    fn root(&self) -> Option<OdeUnused> {
        None
    }

    fn out(&self) -> Option<OdeUnused> {
        None
    }

    fn set_params(&mut self, p: &V) {
        self.p.copy_from(p);
    }
}
